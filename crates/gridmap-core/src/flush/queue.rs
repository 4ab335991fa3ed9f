use crate::{
    dialect::context::{AssociationContext, TupleContext},
    error::{ErrorOrigin, StoreError},
    model::{Association, AssociationKey, EntityKey, Tuple},
};
use std::collections::{BTreeSet, VecDeque};

///
/// QueuedOperation
///
/// One buffered write, carrying the context it will execute under.
///

#[derive(Clone, Debug)]
pub enum QueuedOperation {
    InsertOrUpdateTuple {
        key: EntityKey,
        tuple: Tuple,
        context: TupleContext,
    },
    RemoveTuple {
        key: EntityKey,
        context: TupleContext,
    },
    InsertOrUpdateAssociation {
        key: AssociationKey,
        association: Association,
        context: AssociationContext,
    },
    RemoveAssociation {
        key: AssociationKey,
        context: AssociationContext,
    },
}

///
/// OperationsQueue
///
/// Ordered buffer of writes for one batch execution. The queue tracks
/// which entity keys currently have a pending upsert so engines can serve
/// reads of not-yet-flushed rows from the batch. A closed queue rejects
/// every further use; that is a programming error, not a store failure.
///

#[derive(Debug, Default)]
pub struct OperationsQueue {
    operations: VecDeque<QueuedOperation>,
    pending_tuples: BTreeSet<EntityKey>,
    closed: bool,
}

impl OperationsQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operations: VecDeque::new(),
            pending_tuples: BTreeSet::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::invariant(
                ErrorOrigin::Flush,
                "operations queue used after close",
            ));
        }

        Ok(())
    }

    pub fn add(&mut self, operation: QueuedOperation) -> Result<(), StoreError> {
        self.ensure_open()?;

        match &operation {
            QueuedOperation::InsertOrUpdateTuple { key, .. } => {
                self.pending_tuples.insert(key.clone());
            }
            QueuedOperation::RemoveTuple { key, .. } => {
                self.pending_tuples.remove(key);
            }
            _ => {}
        }
        self.operations.push_back(operation);

        Ok(())
    }

    /// Next buffered operation in insertion order.
    pub fn poll(&mut self) -> Result<Option<QueuedOperation>, StoreError> {
        self.ensure_open()?;

        let operation = self.operations.pop_front();
        if let Some(QueuedOperation::InsertOrUpdateTuple { key, .. }) = &operation {
            self.pending_tuples.remove(key);
        }

        Ok(operation)
    }

    /// Whether an upsert for this key is still buffered.
    #[must_use]
    pub fn contains_tuple(&self, key: &EntityKey) -> bool {
        self.pending_tuples.contains(key)
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.operations.clear();
        self.pending_tuples.clear();
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedOperation> {
        self.operations.iter()
    }
}

///
/// TESTS
///
