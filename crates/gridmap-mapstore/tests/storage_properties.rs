//! Property coverage for the storage codec path: whatever row shape a
//! session hands the dialect must come back identical after a store and
//! reload, across every value type the model supports.

use chrono::DateTime;
use gridmap_core::{
    dialect::{
        GridDialect, MultigetGridDialect, OptimisticLockingAwareGridDialect, TupleContext,
        TupleTypeContext,
    },
    model::{EntityKey, EntityKeyMetadata, Float64, Tuple, Value},
    options::OptionsRegistry,
};
use gridmap_mapstore::{MapDatastore, MapDialect};
use proptest::prelude::*;
use std::{collections::BTreeMap, sync::Arc};

fn dialect() -> MapDialect {
    MapDialect::new(Arc::new(MapDatastore::new()))
}

fn key(id: i64) -> EntityKey {
    let metadata = Arc::new(EntityKeyMetadata::try_new("Order", ["id"]).unwrap());
    EntityKey::try_new(metadata, vec![Value::Int(id)]).unwrap()
}

fn ctx() -> TupleContext {
    TupleContext::new(Arc::new(TupleTypeContext::new(
        "Order",
        ["id"],
        Arc::new(OptionsRegistry::default()),
    )))
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        any::<f64>().prop_filter_map("finite floats only", |f| Float64::try_new(f)
            .map(Value::Float)),
        "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        (0..4_102_444_800_000_i64).prop_filter_map("timestamp in range", |ms| {
            DateTime::from_timestamp_millis(ms).map(Value::DateTime)
        }),
    ]
}

fn arb_row() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..8)
}

fn tuple_of(row: &BTreeMap<String, Value>) -> Tuple {
    let mut tuple = Tuple::for_insert();
    for (column, value) in row {
        tuple.put(column.clone(), value.clone());
    }
    tuple
}

proptest! {
    #[test]
    fn any_row_survives_store_and_reload(row in arb_row(), id in any::<i64>()) {
        let dialect = dialect();
        let key = key(id);

        dialect.insert_or_update_tuple(&key, &tuple_of(&row), &ctx()).unwrap();
        let loaded = dialect.get_tuple(&key, &ctx()).unwrap().unwrap();

        prop_assert_eq!(loaded.to_map(), row);
    }

    #[test]
    fn multiget_agrees_with_single_reads(
        rows in prop::collection::btree_map(any::<i64>(), arb_row(), 0..6),
        probes in prop::collection::vec(any::<i64>(), 0..6),
    ) {
        let dialect = dialect();
        for (id, row) in &rows {
            dialect.insert_or_update_tuple(&key(*id), &tuple_of(row), &ctx()).unwrap();
        }

        let keys: Vec<EntityKey> = probes.iter().map(|id| key(*id)).collect();
        let multi = dialect.as_multiget().unwrap().get_tuples(&keys, &ctx()).unwrap();

        prop_assert_eq!(multi.len(), probes.len());
        for (probe, loaded) in probes.iter().zip(&multi) {
            let single = dialect.get_tuple(&key(*probe), &ctx()).unwrap();
            prop_assert_eq!(
                loaded.as_ref().map(Tuple::to_map),
                single.as_ref().map(Tuple::to_map)
            );
        }
    }

    #[test]
    fn cas_succeeds_only_on_exact_lock_state(row in prop::collection::btree_map("[a-z]{1,8}", arb_value(), 1..6)) {
        let dialect = dialect();
        let key = key(1);

        dialect.insert_or_update_tuple(&key, &tuple_of(&row), &ctx()).unwrap();
        let cas = dialect.as_optimistic_locking_aware().unwrap();

        // an exact snapshot of the stored row always wins the race
        let lock_state = Tuple::from_snapshot(row.clone());
        prop_assert!(cas.update_tuple_with_optimistic_lock(&key, &lock_state, &tuple_of(&row), &ctx()).unwrap());

        // mutating any one expected column loses it
        let (column, value) = row.iter().next().unwrap();
        let sentinel = Value::Text("__diverged__".to_string());
        prop_assume!(*value != sentinel);

        let mut stale = Tuple::from_snapshot(row.clone());
        stale.put(column.clone(), sentinel);
        prop_assert!(!cas.update_tuple_with_optimistic_lock(&key, &stale, &tuple_of(&row), &ctx()).unwrap());
    }
}
