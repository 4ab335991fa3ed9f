use crate::{
    flush::queue::QueuedOperation,
    model::{Association, AssociationKey, EntityKey, EntityKeyMetadata, Tuple},
};
use std::{fmt, sync::Arc};

///
/// GridDialectOperation
///
/// Immutable record of one attempted store operation, carrying enough
/// context to be logged, reported to an error handler, or compensated.
/// Created at the moment the operation is attempted, collected into the
/// flush cycle's ordered applied log, and handed by value to the handler
/// when the cycle ends.
///

#[derive(Clone, Debug)]
pub enum GridDialectOperation {
    CreateTuple {
        metadata: Arc<EntityKeyMetadata>,
    },
    CreateTupleWithKey {
        key: EntityKey,
    },
    /// Identity-column insert; the tuple is the state handed to the store,
    /// before any generated id was written back.
    InsertTuple {
        metadata: Arc<EntityKeyMetadata>,
        tuple: Tuple,
    },
    InsertOrUpdateTuple {
        key: EntityKey,
        tuple: Tuple,
    },
    RemoveTuple {
        key: EntityKey,
    },
    UpdateTupleWithOptimisticLock {
        key: EntityKey,
        old_lock_state: Tuple,
        tuple: Tuple,
    },
    RemoveTupleWithOptimisticLock {
        key: EntityKey,
        old_lock_state: Tuple,
    },
    CreateAssociationWithKey {
        key: AssociationKey,
    },
    InsertOrUpdateAssociation {
        key: AssociationKey,
        association: Association,
    },
    RemoveAssociation {
        key: AssociationKey,
    },
    ExecuteBatch {
        operations: Vec<GridDialectOperation>,
    },
}

impl GridDialectOperation {
    /// Stable label for logs and handler diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateTuple { .. } => "create_tuple",
            Self::CreateTupleWithKey { .. } => "create_tuple_with_key",
            Self::InsertTuple { .. } => "insert_tuple",
            Self::InsertOrUpdateTuple { .. } => "insert_or_update_tuple",
            Self::RemoveTuple { .. } => "remove_tuple",
            Self::UpdateTupleWithOptimisticLock { .. } => "update_tuple_with_optimistic_lock",
            Self::RemoveTupleWithOptimisticLock { .. } => "remove_tuple_with_optimistic_lock",
            Self::CreateAssociationWithKey { .. } => "create_association_with_key",
            Self::InsertOrUpdateAssociation { .. } => "insert_or_update_association",
            Self::RemoveAssociation { .. } => "remove_association",
            Self::ExecuteBatch { .. } => "execute_batch",
        }
    }
}

impl fmt::Display for GridDialectOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTuple { metadata } | Self::InsertTuple { metadata, .. } => {
                write!(f, "{}({metadata})", self.label())
            }
            Self::CreateTupleWithKey { key }
            | Self::InsertOrUpdateTuple { key, .. }
            | Self::RemoveTuple { key }
            | Self::UpdateTupleWithOptimisticLock { key, .. }
            | Self::RemoveTupleWithOptimisticLock { key, .. } => {
                write!(f, "{}({key})", self.label())
            }
            Self::CreateAssociationWithKey { key }
            | Self::InsertOrUpdateAssociation { key, .. }
            | Self::RemoveAssociation { key } => {
                write!(f, "{}({key})", self.label())
            }
            Self::ExecuteBatch { operations } => {
                write!(f, "{}({} operations)", self.label(), operations.len())
            }
        }
    }
}

impl From<&QueuedOperation> for GridDialectOperation {
    fn from(operation: &QueuedOperation) -> Self {
        match operation {
            QueuedOperation::InsertOrUpdateTuple { key, tuple, .. } => Self::InsertOrUpdateTuple {
                key: key.clone(),
                tuple: tuple.clone(),
            },
            QueuedOperation::RemoveTuple { key, .. } => Self::RemoveTuple { key: key.clone() },
            QueuedOperation::InsertOrUpdateAssociation {
                key, association, ..
            } => Self::InsertOrUpdateAssociation {
                key: key.clone(),
                association: association.clone(),
            },
            QueuedOperation::RemoveAssociation { key, .. } => Self::RemoveAssociation {
                key: key.clone(),
            },
        }
    }
}
