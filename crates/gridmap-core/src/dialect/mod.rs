pub mod capabilities;
pub mod context;
pub mod lock;
pub mod query;

pub use capabilities::{BoundDialect, DialectCapabilities};
pub use context::{
    AssociationContext, AssociationTypeContext, TransactionContext, TupleContext,
    TupleTypeContext,
};
pub use lock::{LockGuard, LockMode, LockingStrategy};
pub use query::{NativeQuery, QueryableGridDialect};

use crate::{
    error::StoreError,
    flush::OperationsQueue,
    id::NextValueRequest,
    model::{
        Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    },
};
use std::sync::Arc;

///
/// DuplicateInsertPrevention
///
/// How a store detects an insert colliding with an existing row.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DuplicateInsertPrevention {
    /// The store raises its own duplicate-key failure on insert.
    NativeException,
    /// The engine must look the key up before inserting.
    LookUp,
}

///
/// GridDialect
///
/// The minimal contract every datastore module implements: tuple and
/// association CRUD, id generation, table scans, and pessimistic locking
/// strategy discovery. Everything beyond this lives in optional facets
/// reached through the `as_*` accessors; support is probed once at boot
/// (see [`DialectCapabilities`]) and never changes at runtime.
///
/// One dialect instance is shared by every session of a factory, so
/// implementations must be `Send + Sync` and safe under concurrent
/// sessions. Calls block on the calling thread; contexts are borrowed for
/// the call and never retained.
///

pub trait GridDialect: Send + Sync {
    /// Short stable name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Produce a transient tuple for a row about to be inserted. Must not
    /// touch the datastore; an implementation performing I/O here is
    /// defective. The default empty insert-kind tuple is correct for
    /// nearly every store.
    fn create_tuple(&self, _metadata: &Arc<EntityKeyMetadata>, _context: &TupleContext) -> Tuple {
        Tuple::for_insert()
    }

    /// Read one row. An absent row is `Ok(None)`, never an error.
    fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, StoreError>;

    /// Upsert one row from the tuple's staged ops. Concurrent writers of
    /// the same key race under the store's own consistency model; callers
    /// needing stronger guarantees use the optimistic or pessimistic
    /// facilities.
    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<(), StoreError>;

    /// Remove one row. Idempotent: removing an absent row succeeds.
    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<(), StoreError>;

    /// Produce a transient association. Must not touch the datastore.
    fn create_association(
        &self,
        _key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Association {
        Association::for_insert()
    }

    /// Read one association. Absent is `Ok(None)`, never an error.
    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, StoreError>;

    /// Upsert an association from its staged row ops.
    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), StoreError>;

    /// Remove one association. Idempotent.
    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), StoreError>;

    /// Whether this store keeps the association's rows inside the owning
    /// entity's own structure rather than a dedicated one. Document
    /// stores embedding collections answer true.
    fn is_stored_in_entity_structure(
        &self,
        _metadata: &AssociationKeyMetadata,
        _context: &AssociationTypeContext,
    ) -> bool {
        false
    }

    /// Next value of an id source. An absent source is initialized to the
    /// request's initial value, which becomes the first returned value;
    /// later requests advance by the request's increment.
    fn next_value(&self, request: &NextValueRequest) -> Result<i64, StoreError>;

    /// Whether the store backs sequence-kind id sources natively. Engines
    /// fall back to the table strategy when false.
    fn supports_sequences(&self) -> bool {
        false
    }

    /// How the engine must guard inserts against key collisions.
    fn duplicate_insert_prevention(
        &self,
        _metadata: &Arc<EntityKeyMetadata>,
    ) -> DuplicateInsertPrevention {
        DuplicateInsertPrevention::LookUp
    }

    /// Visit every stored tuple of one entity type. Drives mass indexing
    /// and store-wide maintenance.
    fn for_each_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        type_context: &TupleTypeContext,
        consumer: &mut dyn FnMut(Tuple),
    ) -> Result<(), StoreError>;

    /// Pessimistic locking strategy for an entity type and mode. `None`
    /// means the store does not enforce this mode, which callers must
    /// treat as "unenforced", not as failure.
    fn locking_strategy(
        &self,
        _metadata: &Arc<EntityKeyMetadata>,
        _mode: LockMode,
    ) -> Option<Box<dyn LockingStrategy>> {
        None
    }

    // ---- facet accessors ----

    fn as_multiget(&self) -> Option<&dyn MultigetGridDialect> {
        None
    }

    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        None
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        None
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        None
    }

    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        None
    }
}

///
/// MultigetGridDialect
///
/// Facet for stores that can read several keys in one round trip. All
/// keys of one call share the same entity metadata; that is the caller's
/// contract.
///

pub trait MultigetGridDialect {
    /// Read the given keys. The result has exactly the input's length and
    /// order, with `None` at every index whose key has no row.
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, StoreError>;
}

///
/// IdentityColumnAwareGridDialect
///
/// Facet for stores generating row identifiers during insert. The store
/// must write the generated id back into the tuple under the metadata's
/// key columns before returning, so the engine can observe it.
///

pub trait IdentityColumnAwareGridDialect {
    fn insert_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<(), StoreError>;
}

///
/// OptimisticLockingAwareGridDialect
///
/// Facet for stores with atomic compare-and-swap on rows. `Ok(false)`
/// reports that the stored row no longer matches the expected lock state;
/// it is the concurrency conflict signal, distinct from `Err` which
/// reports store failure. Only columns present in the old lock state
/// participate in the comparison.
///

pub trait OptimisticLockingAwareGridDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, StoreError>;

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, StoreError>;
}

///
/// BatchableGridDialect
///
/// Facet for stores that benefit from executing buffered operations in
/// one go. The queue is drained in insertion order.
///

pub trait BatchableGridDialect {
    fn execute_batch(&self, queue: &mut OperationsQueue) -> Result<(), StoreError>;
}
