use crate::codec::RawRecord;
use gridmap_core::{
    error::StoreError,
    model::{AssociationKey, EntityKey, IdSourceKey, RowKey, Value},
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

///
/// MapDatastore
///
/// Process-local reference datastore: plain ordered maps behind locks.
/// Entity rows are stored as encoded records, association rows as nested
/// maps, id sources as shared counters. One instance backs every session
/// of a factory, so all access is through interior mutability.
///

#[derive(Debug, Default)]
pub struct MapDatastore {
    rows: RwLock<BTreeMap<EntityKey, RawRecord>>,
    associations: RwLock<AssociationRows>,
    sequences: Mutex<BTreeMap<IdSourceKey, i64>>,
    identities: Mutex<BTreeMap<String, i64>>,
    locks: LockTable,
}

type AssociationRows = BTreeMap<AssociationKey, BTreeMap<RowKey, BTreeMap<String, Value>>>;

impl MapDatastore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---- entity records ----

    #[must_use]
    pub fn get_record(&self, key: &EntityKey) -> Option<RawRecord> {
        self.rows.read().get(key).cloned()
    }

    pub fn put_record(&self, key: EntityKey, record: RawRecord) {
        self.rows.write().insert(key, record);
    }

    pub fn remove_record(&self, key: &EntityKey) {
        self.rows.write().remove(key);
    }

    /// Run a closure under the write lock, for read-compare-write
    /// sequences that must observe no interleaved writer.
    pub(crate) fn with_rows_mut<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<EntityKey, RawRecord>) -> R,
    ) -> R {
        f(&mut self.rows.write())
    }

    /// Snapshot of every record in one table, taken under the read lock.
    #[must_use]
    pub fn records_for_table(&self, table: &str) -> Vec<(EntityKey, RawRecord)> {
        self.rows
            .read()
            .iter()
            .filter(|(key, _)| key.table() == table)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.rows.read().len()
    }

    // ---- association rows ----

    #[must_use]
    pub fn get_association_rows(
        &self,
        key: &AssociationKey,
    ) -> Option<BTreeMap<RowKey, BTreeMap<String, Value>>> {
        self.associations.read().get(key).cloned()
    }

    pub(crate) fn with_association_rows_mut<R>(
        &self,
        key: &AssociationKey,
        f: impl FnOnce(&mut BTreeMap<RowKey, BTreeMap<String, Value>>) -> R,
    ) -> R {
        let mut associations = self.associations.write();
        f(associations.entry(key.clone()).or_default())
    }

    pub fn remove_association_rows(&self, key: &AssociationKey) {
        self.associations.write().remove(key);
    }

    #[must_use]
    pub fn association_count(&self) -> usize {
        self.associations.read().len()
    }

    // ---- id sources ----

    /// Advance the shared counter behind an id source. An absent counter
    /// is initialized to `initial_value` and that value is returned; an
    /// existing counter advances by `increment`.
    pub fn next_value(&self, key: &IdSourceKey, increment: u32, initial_value: i64) -> i64 {
        let mut sequences = self.sequences.lock();

        match sequences.get_mut(key) {
            Some(current) => {
                *current += i64::from(increment);
                *current
            }
            None => {
                sequences.insert(key.clone(), initial_value);
                initial_value
            }
        }
    }

    /// Next surrogate id for a table with an identity column. Independent
    /// of the id-source counters; starts at 1 per table.
    pub fn next_identity(&self, table: &str) -> i64 {
        let mut identities = self.identities.lock();
        let counter = identities.entry(table.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    // ---- record locks ----

    pub fn lock_record(&self, key: &EntityKey, timeout: Duration) -> Result<(), StoreError> {
        self.locks.acquire(key, timeout)
    }

    pub fn unlock_record(&self, key: &EntityKey) {
        self.locks.release(key);
    }
}

///
/// LockTable
///
/// Cooperative per-key exclusive locks. Writers that agreed to lock wait
/// on the condvar until the holder releases or the timeout runs out;
/// nothing here blocks plain reads or writes that bypass locking.
///

#[derive(Debug, Default)]
struct LockTable {
    held: Mutex<BTreeSet<EntityKey>>,
    released: Condvar,
}

impl LockTable {
    fn acquire(&self, key: &EntityKey, timeout: Duration) -> Result<(), StoreError> {
        let start = Instant::now();
        let mut held = self.held.lock();

        loop {
            if !held.contains(key) {
                held.insert(key.clone());
                return Ok(());
            }

            // zero timeout tries once and gives up
            let Some(remaining) = timeout.checked_sub(start.elapsed()) else {
                return Err(timed_out(key, start));
            };

            if self.released.wait_for(&mut held, remaining).timed_out() && held.contains(key) {
                return Err(timed_out(key, start));
            }
        }
    }

    fn release(&self, key: &EntityKey) {
        let mut held = self.held.lock();
        held.remove(key);
        self.released.notify_all();
    }
}

fn timed_out(key: &EntityKey, start: Instant) -> StoreError {
    StoreError::LockTimeout {
        table: key.table().to_string(),
        key: key.values_display(),
        waited_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap_core::model::{EntityKeyMetadata, IdSourceKeyMetadata};
    use std::sync::Arc;

    fn key(id: i64) -> EntityKey {
        let metadata = Arc::new(EntityKeyMetadata::try_new("Order", ["id"]).unwrap());
        EntityKey::try_new(metadata, vec![Value::Int(id)]).unwrap()
    }

    #[test]
    fn absent_counter_initializes_to_initial_value() {
        let store = MapDatastore::new();
        let metadata = Arc::new(IdSourceKeyMetadata::for_table(
            "sequences",
            "sequence_name",
            "next_val",
        ));
        let source = IdSourceKey::for_table(metadata, "Order");

        assert_eq!(store.next_value(&source, 1, 1), 1);
        assert_eq!(store.next_value(&source, 1, 1), 2);
        assert_eq!(store.next_value(&source, 10, 1), 12);
    }

    #[test]
    fn segments_advance_independently() {
        let store = MapDatastore::new();
        let metadata = Arc::new(IdSourceKeyMetadata::for_table(
            "sequences",
            "sequence_name",
            "next_val",
        ));
        let orders = IdSourceKey::for_table(Arc::clone(&metadata), "Order");
        let users = IdSourceKey::for_table(metadata, "User");

        assert_eq!(store.next_value(&orders, 1, 1), 1);
        assert_eq!(store.next_value(&orders, 1, 1), 2);
        assert_eq!(store.next_value(&users, 1, 100), 100);
    }

    #[test]
    fn identity_counters_are_per_table() {
        let store = MapDatastore::new();

        assert_eq!(store.next_identity("Order"), 1);
        assert_eq!(store.next_identity("Order"), 2);
        assert_eq!(store.next_identity("User"), 1);
    }

    #[test]
    fn held_lock_times_out_second_acquirer() {
        let store = MapDatastore::new();
        store.lock_record(&key(1), Duration::ZERO).unwrap();

        let err = store
            .lock_record(&key(1), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        // a different key is unaffected
        store.lock_record(&key(2), Duration::ZERO).unwrap();
    }

    #[test]
    fn released_lock_is_acquirable_again() {
        let store = MapDatastore::new();
        store.lock_record(&key(1), Duration::ZERO).unwrap();
        store.unlock_record(&key(1));
        store.lock_record(&key(1), Duration::ZERO).unwrap();
    }
}
