use crate::model::value::Value;
use std::collections::{BTreeMap, BTreeSet};

///
/// SnapshotKind
///
/// Whether a tuple began life transiently (`Insert`) or from a backend
/// read (`Update`). Dialects use this to pick insert-vs-update paths and
/// duplicate-key checks.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotKind {
    Insert,
    Update,
}

///
/// TupleOp
///
/// One staged change to a single column. `Put(Value::Null)` stages an
/// explicit null, which is distinct from `Remove`: stores that
/// differentiate "column holds null" from "column absent" must preserve
/// the difference when replaying ops.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TupleOp {
    Put(Value),
    Remove,
}

///
/// Tuple
///
/// One row during load/flush: a read-only snapshot taken at creation time
/// plus the changes staged against it since. Dialects replay the staged
/// ops onto the datastore; the engine reads through the overlay. Iteration
/// over columns is deterministic (sorted by column name). Ops are
/// inherently deduplicated per column, last staging wins. Discarded after
/// flush.
///

#[derive(Clone, Debug)]
pub struct Tuple {
    snapshot: BTreeMap<String, Value>,
    ops: BTreeMap<String, TupleOp>,
    kind: SnapshotKind,
}

impl Tuple {
    /// Transient tuple with an empty snapshot, as handed out by
    /// `create_tuple` before the first flush.
    #[must_use]
    pub const fn for_insert() -> Self {
        Self {
            snapshot: BTreeMap::new(),
            ops: BTreeMap::new(),
            kind: SnapshotKind::Insert,
        }
    }

    /// Tuple over a row loaded from the backend.
    #[must_use]
    pub const fn from_snapshot(snapshot: BTreeMap<String, Value>) -> Self {
        Self {
            snapshot,
            ops: BTreeMap::new(),
            kind: SnapshotKind::Update,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SnapshotKind {
        self.kind
    }

    /// Read one column through the overlay. A staged `Put(Value::Null)`
    /// reads as `Some(Null)`; a staged `Remove` and a never-present column
    /// both read as `None`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self.ops.get(column) {
            Some(TupleOp::Put(value)) => Some(value),
            Some(TupleOp::Remove) => None,
            None => self.snapshot.get(column),
        }
    }

    /// Effective presence of a column (a staged explicit null counts).
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        match self.ops.get(column) {
            Some(TupleOp::Put(_)) => true,
            Some(TupleOp::Remove) => false,
            None => self.snapshot.contains_key(column),
        }
    }

    /// Stage a column write.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.ops.insert(column.into(), TupleOp::Put(value.into()));
    }

    /// Stage a column removal. Staging a removal of a column the snapshot
    /// never held is allowed and harmless.
    pub fn remove(&mut self, column: impl Into<String>) {
        self.ops.insert(column.into(), TupleOp::Remove);
    }

    /// Effective column names: snapshot columns plus staged puts, minus
    /// staged removals. Sorted.
    #[must_use]
    pub fn column_names(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.snapshot.keys().map(String::as_str).collect();
        for (column, op) in &self.ops {
            match op {
                TupleOp::Put(_) => {
                    names.insert(column);
                }
                TupleOp::Remove => {
                    names.remove(column.as_str());
                }
            }
        }

        names
    }

    /// Deterministic iteration over the effective columns.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        let mut effective: BTreeMap<&str, &Value> = self
            .snapshot
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        for (column, op) in &self.ops {
            match op {
                TupleOp::Put(value) => {
                    effective.insert(column, value);
                }
                TupleOp::Remove => {
                    effective.remove(column.as_str());
                }
            }
        }

        effective.into_iter()
    }

    /// Staged changes since the snapshot, deduplicated per column,
    /// in column order.
    pub fn ops(&self) -> impl Iterator<Item = (&str, &TupleOp)> {
        self.ops.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.ops.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column_names().is_empty()
    }

    #[must_use]
    pub const fn snapshot(&self) -> &BTreeMap<String, Value> {
        &self.snapshot
    }

    /// Collapse snapshot and overlay into one plain column map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Replay only the staged ops onto a stored column map, leaving
    /// columns this tuple never touched intact. This is the update path
    /// for stores keeping whole rows: columns outside the loaded snapshot
    /// must survive a partial update.
    pub fn apply_ops_to(&self, target: &mut BTreeMap<String, Value>) {
        for (column, op) in &self.ops {
            match op {
                TupleOp::Put(value) => {
                    target.insert(column.clone(), value.clone());
                }
                TupleOp::Remove => {
                    target.remove(column);
                }
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Tuple {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("id".to_string(), Value::Int(1));
        snapshot.insert("name".to_string(), Value::Text("ada".into()));
        Tuple::from_snapshot(snapshot)
    }

    #[test]
    fn reads_go_through_the_overlay() {
        let mut tuple = loaded();
        assert_eq!(tuple.get("name"), Some(&Value::Text("ada".into())));

        tuple.put("name", "grace");
        assert_eq!(tuple.get("name"), Some(&Value::Text("grace".into())));

        tuple.remove("name");
        assert_eq!(tuple.get("name"), None);
    }

    #[test]
    fn explicit_null_is_present_absent_is_not() {
        let mut tuple = Tuple::for_insert();
        tuple.put("middle_name", Value::Null);

        assert!(tuple.contains("middle_name"));
        assert_eq!(tuple.get("middle_name"), Some(&Value::Null));
        assert!(!tuple.contains("last_name"));
        assert_eq!(tuple.get("last_name"), None);
    }

    #[test]
    fn column_names_merge_snapshot_and_ops() {
        let mut tuple = loaded();
        tuple.put("age", Value::Int(36));
        tuple.remove("name");

        let names: Vec<&str> = tuple.column_names().into_iter().collect();
        assert_eq!(names, vec!["age", "id"]);
    }

    #[test]
    fn iteration_is_sorted_by_column() {
        let mut tuple = Tuple::for_insert();
        tuple.put("zeta", Value::Int(1));
        tuple.put("alpha", Value::Int(2));
        tuple.put("mid", Value::Int(3));

        let columns: Vec<&str> = tuple.iter().map(|(k, _)| k).collect();
        assert_eq!(columns, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn ops_are_deduplicated_last_staging_wins() {
        let mut tuple = Tuple::for_insert();
        tuple.put("state", "new");
        tuple.put("state", "paid");
        tuple.remove("state");

        let ops: Vec<(&str, &TupleOp)> = tuple.ops().collect();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0], ("state", &TupleOp::Remove));
    }

    #[test]
    fn apply_ops_preserves_untouched_stored_columns() {
        // stored row holds a column the loading snapshot never saw
        let mut stored = BTreeMap::new();
        stored.insert("id".to_string(), Value::Int(1));
        stored.insert("legacy".to_string(), Value::Bool(true));

        let mut snapshot = BTreeMap::new();
        snapshot.insert("id".to_string(), Value::Int(1));
        let mut tuple = Tuple::from_snapshot(snapshot);
        tuple.put("name", "ada");

        tuple.apply_ops_to(&mut stored);

        assert_eq!(stored.get("legacy"), Some(&Value::Bool(true)));
        assert_eq!(stored.get("name"), Some(&Value::Text("ada".into())));
    }

    #[test]
    fn to_map_collapses_snapshot_and_overlay() {
        let mut tuple = loaded();
        tuple.put("age", Value::Int(36));
        tuple.remove("name");

        let map = tuple.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id"), Some(&Value::Int(1)));
        assert_eq!(map.get("age"), Some(&Value::Int(36)));
    }

    mod overlay_properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Staged {
            Put(String, Value),
            Remove(String),
        }

        fn arb_column() -> impl Strategy<Value = String> {
            prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")]
                .prop_map(str::to_string)
        }

        fn arb_scalar() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::Int),
                "[a-z]{0,6}".prop_map(Value::Text),
            ]
        }

        fn arb_staged() -> impl Strategy<Value = Staged> {
            prop_oneof![
                (arb_column(), arb_scalar()).prop_map(|(c, v)| Staged::Put(c, v)),
                arb_column().prop_map(Staged::Remove),
            ]
        }

        proptest! {
            /// Collapsing the overlay and replaying the ops onto the raw
            /// snapshot are the same thing.
            #[test]
            fn to_map_equals_ops_replayed_on_snapshot(
                snapshot in prop::collection::btree_map(arb_column(), arb_scalar(), 0..4),
                staged in prop::collection::vec(arb_staged(), 0..12),
            ) {
                let mut tuple = Tuple::from_snapshot(snapshot.clone());
                for op in &staged {
                    match op {
                        Staged::Put(column, value) => tuple.put(column.clone(), value.clone()),
                        Staged::Remove(column) => tuple.remove(column.clone()),
                    }
                }

                let mut replayed = snapshot;
                tuple.apply_ops_to(&mut replayed);

                prop_assert_eq!(tuple.to_map(), replayed);

                // and reads agree with the collapsed view, column by column
                let collapsed = tuple.to_map();
                for column in tuple.column_names() {
                    prop_assert_eq!(tuple.get(column), collapsed.get(column));
                }
            }
        }
    }
}
