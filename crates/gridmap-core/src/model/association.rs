use crate::model::{key::RowKey, tuple::Tuple, value::Value};
use std::collections::{BTreeMap, BTreeSet};

///
/// AssociationOp
///

#[derive(Clone, Debug)]
pub enum AssociationOp {
    Put(Tuple),
    Remove,
}

///
/// Association
///
/// The rows of one association during load/flush: a snapshot of the rows
/// read from the backend plus the row changes staged since, mirroring the
/// tuple's snapshot/overlay design one level up. Row iteration is
/// deterministic (sorted by row key); ops are deduplicated per row key.
///

#[derive(Clone, Debug, Default)]
pub struct Association {
    snapshot: BTreeMap<RowKey, Tuple>,
    ops: BTreeMap<RowKey, AssociationOp>,
}

impl Association {
    /// Transient association with no rows, as handed out by
    /// `create_association` before the first flush.
    #[must_use]
    pub const fn for_insert() -> Self {
        Self {
            snapshot: BTreeMap::new(),
            ops: BTreeMap::new(),
        }
    }

    /// Association over rows loaded from the backend.
    #[must_use]
    pub const fn from_snapshot(snapshot: BTreeMap<RowKey, Tuple>) -> Self {
        Self {
            snapshot,
            ops: BTreeMap::new(),
        }
    }

    /// Read one row through the overlay.
    #[must_use]
    pub fn get(&self, key: &RowKey) -> Option<&Tuple> {
        match self.ops.get(key) {
            Some(AssociationOp::Put(tuple)) => Some(tuple),
            Some(AssociationOp::Remove) => None,
            None => self.snapshot.get(key),
        }
    }

    /// Stage a row write.
    pub fn put(&mut self, key: RowKey, row: Tuple) {
        self.ops.insert(key, AssociationOp::Put(row));
    }

    /// Stage a row removal.
    pub fn remove(&mut self, key: &RowKey) {
        self.ops.insert(key.clone(), AssociationOp::Remove);
    }

    /// Effective row keys: snapshot rows plus staged puts, minus staged
    /// removals. Sorted.
    #[must_use]
    pub fn row_keys(&self) -> BTreeSet<&RowKey> {
        let mut keys: BTreeSet<&RowKey> = self.snapshot.keys().collect();
        for (key, op) in &self.ops {
            match op {
                AssociationOp::Put(_) => {
                    keys.insert(key);
                }
                AssociationOp::Remove => {
                    keys.remove(key);
                }
            }
        }

        keys
    }

    /// Deterministic iteration over the effective rows.
    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &Tuple)> {
        let mut effective: BTreeMap<&RowKey, &Tuple> = self.snapshot.iter().collect();
        for (key, op) in &self.ops {
            match op {
                AssociationOp::Put(tuple) => {
                    effective.insert(key, tuple);
                }
                AssociationOp::Remove => {
                    effective.remove(key);
                }
            }
        }

        effective.into_iter()
    }

    /// Staged row changes since the snapshot, deduplicated per row key,
    /// in key order.
    pub fn ops(&self) -> impl Iterator<Item = (&RowKey, &AssociationOp)> {
        self.ops.iter()
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.ops.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_keys().is_empty()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.row_keys().len()
    }

    /// Replay only the staged row ops onto a stored association, leaving
    /// rows this association never touched intact.
    pub fn apply_ops_to(&self, target: &mut BTreeMap<RowKey, BTreeMap<String, Value>>) {
        for (key, op) in &self.ops {
            match op {
                AssociationOp::Put(tuple) => {
                    target.insert(key.clone(), tuple.to_map());
                }
                AssociationOp::Remove => {
                    target.remove(key);
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
    use std::sync::Arc;

    fn row_key(item: i64) -> RowKey {
        let columns = Arc::new(vec!["order_id".to_string(), "item_id".to_string()]);
        RowKey::try_new(columns, vec![Value::Int(1), Value::Int(item)]).unwrap()
    }

    fn row(qty: i64) -> Tuple {
        let mut tuple = Tuple::for_insert();
        tuple.put("qty", Value::Int(qty));
        tuple
    }

    #[test]
    fn rows_read_through_the_overlay() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(row_key(1), row(5));
        let mut association = Association::from_snapshot(snapshot);

        association.put(row_key(2), row(9));
        association.remove(&row_key(1));

        assert!(association.get(&row_key(1)).is_none());
        let second = association.get(&row_key(2)).unwrap();
        assert_eq!(second.get("qty"), Some(&Value::Int(9)));
        assert_eq!(association.size(), 1);
    }

    #[test]
    fn apply_ops_preserves_untouched_rows() {
        let mut stored: BTreeMap<RowKey, BTreeMap<String, Value>> = BTreeMap::new();
        stored.insert(row_key(1), row(5).to_map());
        stored.insert(row_key(2), row(7).to_map());

        let mut association = Association::for_insert();
        association.put(row_key(3), row(1));
        association.remove(&row_key(2));

        association.apply_ops_to(&mut stored);

        assert_eq!(stored.len(), 2);
        assert!(stored.contains_key(&row_key(1)));
        assert!(stored.contains_key(&row_key(3)));
    }

    #[test]
    fn row_iteration_is_sorted_by_key() {
        let mut association = Association::for_insert();
        association.put(row_key(3), row(1));
        association.put(row_key(1), row(2));
        association.put(row_key(2), row(3));

        let items: Vec<i64> = association
            .rows()
            .map(|(key, _)| key.values()[1].as_i64().unwrap())
            .collect();
        assert_eq!(items, vec![1, 2, 3]);
    }
}
