use crate::{codec, store::MapDatastore};
use gridmap_core::{
    config::{Properties, settings},
    dialect::{
        BatchableGridDialect, DuplicateInsertPrevention, GridDialect,
        IdentityColumnAwareGridDialect, MultigetGridDialect, OptimisticLockingAwareGridDialect,
        context::{AssociationContext, TupleContext, TupleTypeContext},
        lock::{LockGuard, LockMode, LockingStrategy},
    },
    error::{ErrorOrigin, StoreError},
    flush::{OperationsQueue, QueuedOperation},
    id::NextValueRequest,
    model::{Association, AssociationKey, EntityKey, EntityKeyMetadata, Tuple, Value},
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::debug;

///
/// MapDialect
///
/// Grid dialect over [`MapDatastore`]: the reference backend used to pin
/// contract semantics and to run engine tests without a server. Supports
/// every facet except native queries.
///

#[derive(Debug)]
pub struct MapDialect {
    store: Arc<MapDatastore>,
    lock_timeout: Duration,
}

impl MapDialect {
    #[must_use]
    pub fn new(store: Arc<MapDatastore>) -> Self {
        Self {
            store,
            lock_timeout: Duration::from_millis(settings::DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    /// Build from integrator properties, honoring the configured lock
    /// acquisition timeout.
    pub fn from_properties(
        store: Arc<MapDatastore>,
        properties: &Properties,
    ) -> Result<Self, StoreError> {
        let lock_timeout = properties
            .property::<Duration>(settings::LOCK_TIMEOUT_MS)
            .with_default(Duration::from_millis(settings::DEFAULT_LOCK_TIMEOUT_MS))
            .get()?;

        debug!(?lock_timeout, "map dialect configured");

        Ok(Self {
            store,
            lock_timeout,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<MapDatastore> {
        &self.store
    }

    /// Default wait for pessimistic lock acquisition, when the caller has
    /// no per-call override.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl GridDialect for MapDialect {
    fn name(&self) -> &'static str {
        "map"
    }

    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, StoreError> {
        match self.store.get_record(key) {
            Some(record) => Ok(Some(Tuple::from_snapshot(codec::decode_row(&record, key)?))),
            None => Ok(None),
        }
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        _context: &TupleContext,
    ) -> Result<(), StoreError> {
        self.store.with_rows_mut(|rows| {
            let mut row = match rows.get(key) {
                Some(record) => codec::decode_row(record, key)?,
                None => BTreeMap::new(),
            };

            tuple.apply_ops_to(&mut row);
            rows.insert(key.clone(), codec::encode_row(&row)?);

            Ok(())
        })
    }

    fn remove_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<(), StoreError> {
        self.store.remove_record(key);
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Option<Association>, StoreError> {
        Ok(self.store.get_association_rows(key).map(|rows| {
            let snapshot = rows
                .into_iter()
                .map(|(row_key, columns)| (row_key, Tuple::from_snapshot(columns)))
                .collect();

            Association::from_snapshot(snapshot)
        }))
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        _context: &AssociationContext,
    ) -> Result<(), StoreError> {
        self.store
            .with_association_rows_mut(key, |rows| association.apply_ops_to(rows));

        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<(), StoreError> {
        self.store.remove_association_rows(key);
        Ok(())
    }

    fn next_value(&self, request: &NextValueRequest) -> Result<i64, StoreError> {
        Ok(self.store.next_value(
            request.key(),
            request.increment(),
            request.initial_value(),
        ))
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn duplicate_insert_prevention(
        &self,
        _metadata: &Arc<EntityKeyMetadata>,
    ) -> DuplicateInsertPrevention {
        DuplicateInsertPrevention::LookUp
    }

    fn for_each_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        _type_context: &TupleTypeContext,
        consumer: &mut dyn FnMut(Tuple),
    ) -> Result<(), StoreError> {
        // snapshot first so the consumer never runs under the store lock
        let records = self.store.records_for_table(metadata.table());

        for (key, record) in records {
            consumer(Tuple::from_snapshot(codec::decode_row(&record, &key)?));
        }

        Ok(())
    }

    fn locking_strategy(
        &self,
        _metadata: &Arc<EntityKeyMetadata>,
        mode: LockMode,
    ) -> Option<Box<dyn LockingStrategy>> {
        Some(Box::new(MapLockingStrategy {
            store: Arc::clone(&self.store),
            mode,
        }))
    }

    // ---- facet accessors ----

    fn as_multiget(&self) -> Option<&dyn MultigetGridDialect> {
        Some(self)
    }

    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        Some(self)
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        Some(self)
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        Some(self)
    }
}

impl MultigetGridDialect for MapDialect {
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, StoreError> {
        keys.iter().map(|key| self.get_tuple(key, context)).collect()
    }
}

impl IdentityColumnAwareGridDialect for MapDialect {
    fn insert_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<(), StoreError> {
        let id = self.store.next_identity(metadata.table());

        // metadata guarantees at least one key column; the surrogate id
        // goes to the first
        let id_column = metadata.column_names()[0].clone();
        tuple.put(id_column, Value::Int(id));

        let values = metadata
            .column_names()
            .iter()
            .map(|column| {
                tuple.get(column).cloned().ok_or_else(|| {
                    StoreError::invariant(
                        ErrorOrigin::Dialect,
                        format!("identity insert missing key column '{column}'"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key = EntityKey::try_new(Arc::clone(metadata), values)?;
        self.insert_or_update_tuple(&key, tuple, context)
    }
}

impl OptimisticLockingAwareGridDialect for MapDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        _context: &TupleContext,
    ) -> Result<bool, StoreError> {
        self.store.with_rows_mut(|rows| {
            let Some(record) = rows.get(key) else {
                return Ok(false);
            };

            let mut row = codec::decode_row(record, key)?;
            if !lock_state_matches(&row, old_lock_state) {
                return Ok(false);
            }

            tuple.apply_ops_to(&mut row);
            rows.insert(key.clone(), codec::encode_row(&row)?);

            Ok(true)
        })
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        _context: &TupleContext,
    ) -> Result<bool, StoreError> {
        self.store.with_rows_mut(|rows| {
            let Some(record) = rows.get(key) else {
                return Ok(false);
            };

            let row = codec::decode_row(record, key)?;
            if !lock_state_matches(&row, old_lock_state) {
                return Ok(false);
            }

            rows.remove(key);

            Ok(true)
        })
    }
}

impl BatchableGridDialect for MapDialect {
    fn execute_batch(&self, queue: &mut OperationsQueue) -> Result<(), StoreError> {
        debug!(operations = queue.len(), "executing batched operations");

        while let Some(operation) = queue.poll()? {
            match operation {
                QueuedOperation::InsertOrUpdateTuple {
                    key,
                    tuple,
                    context,
                } => self.insert_or_update_tuple(&key, &tuple, &context)?,
                QueuedOperation::RemoveTuple { key, context } => {
                    self.remove_tuple(&key, &context)?;
                }
                QueuedOperation::InsertOrUpdateAssociation {
                    key,
                    association,
                    context,
                } => self.insert_or_update_association(&key, &association, &context)?,
                QueuedOperation::RemoveAssociation { key, context } => {
                    self.remove_association(&key, &context)?;
                }
            }
        }

        Ok(())
    }
}

/// Only the columns present in the expected lock state participate in the
/// comparison; other columns may drift freely.
fn lock_state_matches(row: &BTreeMap<String, Value>, old_lock_state: &Tuple) -> bool {
    old_lock_state
        .column_names()
        .into_iter()
        .all(|column| row.get(column) == old_lock_state.get(column))
}

///
/// MapLockingStrategy
///
/// Pessimistic locking over the store's cooperative lock table. Read and
/// write modes share the same exclusive lock.
///

struct MapLockingStrategy {
    store: Arc<MapDatastore>,
    mode: LockMode,
}

impl LockingStrategy for MapLockingStrategy {
    fn mode(&self) -> LockMode {
        self.mode
    }

    fn lock_entity(&self, key: &EntityKey, timeout: Duration) -> Result<LockGuard, StoreError> {
        self.store.lock_record(key, timeout)?;

        Ok(LockGuard::new(MapLockHold {
            store: Arc::clone(&self.store),
            key: key.clone(),
        }))
    }
}

struct MapLockHold {
    store: Arc<MapDatastore>,
    key: EntityKey,
}

impl Drop for MapLockHold {
    fn drop(&mut self) {
        self.store.unlock_record(&self.key);
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap_core::options::OptionsRegistry;

    fn dialect() -> MapDialect {
        MapDialect::new(Arc::new(MapDatastore::new()))
    }

    fn metadata() -> Arc<EntityKeyMetadata> {
        Arc::new(EntityKeyMetadata::try_new("Order", ["id"]).unwrap())
    }

    fn ctx() -> TupleContext {
        TupleContext::new(Arc::new(TupleTypeContext::new(
            "Order",
            ["id", "total"],
            Arc::new(OptionsRegistry::default()),
        )))
    }

    #[test]
    fn identity_insert_writes_generated_id_back() {
        let dialect = dialect();

        let mut first = Tuple::for_insert();
        first.put("total", 10_i64);
        dialect.insert_tuple(&metadata(), &mut first, &ctx()).unwrap();

        let mut second = Tuple::for_insert();
        second.put("total", 20_i64);
        dialect.insert_tuple(&metadata(), &mut second, &ctx()).unwrap();

        assert_eq!(first.get("id"), Some(&Value::Int(1)));
        assert_eq!(second.get("id"), Some(&Value::Int(2)));

        let key = EntityKey::try_new(metadata(), vec![Value::Int(2)]).unwrap();
        let stored = dialect.get_tuple(&key, &ctx()).unwrap().unwrap();
        assert_eq!(stored.get("total"), Some(&Value::Int(20)));
    }

    #[test]
    fn batch_drains_the_queue_in_order() {
        let dialect = dialect();
        let key = EntityKey::try_new(metadata(), vec![Value::Int(1)]).unwrap();

        let mut tuple = Tuple::for_insert();
        tuple.put("id", 1_i64);
        tuple.put("total", 10_i64);

        let mut queue = OperationsQueue::new();
        queue
            .add(QueuedOperation::InsertOrUpdateTuple {
                key: key.clone(),
                tuple,
                context: ctx(),
            })
            .unwrap();
        queue
            .add(QueuedOperation::RemoveTuple {
                key: key.clone(),
                context: ctx(),
            })
            .unwrap();

        dialect.execute_batch(&mut queue).unwrap();

        assert!(queue.is_empty());
        assert!(dialect.get_tuple(&key, &ctx()).unwrap().is_none());
    }

    #[test]
    fn lock_guard_releases_on_drop() {
        let dialect = dialect();
        let key = EntityKey::try_new(metadata(), vec![Value::Int(1)]).unwrap();

        let strategy = dialect
            .locking_strategy(&metadata(), LockMode::PessimisticWrite)
            .expect("map store enforces pessimistic locks");

        let guard = strategy.lock_entity(&key, Duration::ZERO).unwrap();
        assert!(matches!(
            strategy.lock_entity(&key, Duration::ZERO).unwrap_err(),
            StoreError::LockTimeout { .. }
        ));

        drop(guard);
        strategy.lock_entity(&key, Duration::ZERO).unwrap();
    }
}
