use crate::{
    dialect::{
        DuplicateInsertPrevention, GridDialect,
        context::{AssociationContext, AssociationTypeContext, TupleContext, TupleTypeContext},
        lock::{LockMode, LockingStrategy},
        query::NativeQuery,
    },
    error::{ErrorOrigin, StoreError},
    flush::OperationsQueue,
    id::NextValueRequest,
    model::{
        Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    },
};
use std::{fmt, sync::Arc};
use tracing::info;

///
/// DialectCapabilities
///
/// The facet support of one dialect instance, probed once at boot and
/// fixed for the session-factory lifetime. Callers branch on these flags
/// instead of re-querying the dialect per call.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DialectCapabilities {
    multiget: bool,
    identity_column: bool,
    optimistic_locking: bool,
    batch: bool,
    query: bool,
    sequences: bool,
}

impl DialectCapabilities {
    /// Probe a dialect's facet accessors. Support must not change after
    /// this runs; the probed set is the authority from here on.
    #[must_use]
    pub fn probe(dialect: &dyn GridDialect) -> Self {
        Self {
            multiget: dialect.as_multiget().is_some(),
            identity_column: dialect.as_identity_column_aware().is_some(),
            optimistic_locking: dialect.as_optimistic_locking_aware().is_some(),
            batch: dialect.as_batchable().is_some(),
            query: dialect.as_queryable().is_some(),
            sequences: dialect.supports_sequences(),
        }
    }

    #[must_use]
    pub const fn multiget(&self) -> bool {
        self.multiget
    }

    #[must_use]
    pub const fn identity_column(&self) -> bool {
        self.identity_column
    }

    #[must_use]
    pub const fn optimistic_locking(&self) -> bool {
        self.optimistic_locking
    }

    #[must_use]
    pub const fn batch(&self) -> bool {
        self.batch
    }

    #[must_use]
    pub const fn query(&self) -> bool {
        self.query
    }

    #[must_use]
    pub const fn sequences(&self) -> bool {
        self.sequences
    }
}

impl fmt::Display for DialectCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut supported = Vec::new();
        if self.multiget {
            supported.push("multiget");
        }
        if self.identity_column {
            supported.push("identity_column");
        }
        if self.optimistic_locking {
            supported.push("optimistic_locking");
        }
        if self.batch {
            supported.push("batch");
        }
        if self.query {
            supported.push("query");
        }
        if self.sequences {
            supported.push("sequences");
        }

        if supported.is_empty() {
            write!(f, "core only")
        } else {
            write!(f, "{}", supported.join(", "))
        }
    }
}

///
/// BoundDialect
///
/// A dialect instance coupled with its boot-probed capability set. Core
/// operations forward directly; facet operations route through the cached
/// set and fail with the unsupported classification when the facet is
/// absent. Engines preferring graceful degradation (e.g. looping single
/// reads instead of multiget) branch on `capabilities()` before calling.
///

#[derive(Clone)]
pub struct BoundDialect {
    inner: Arc<dyn GridDialect>,
    capabilities: DialectCapabilities,
}

impl BoundDialect {
    #[must_use]
    pub fn new(inner: Arc<dyn GridDialect>) -> Self {
        let capabilities = DialectCapabilities::probe(inner.as_ref());
        info!(dialect = inner.name(), facets = %capabilities, "grid dialect bound");

        Self {
            inner,
            capabilities,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[must_use]
    pub const fn capabilities(&self) -> DialectCapabilities {
        self.capabilities
    }

    /// The probed facet, or the invariant breach when a dialect stops
    /// answering for a facet it advertised at boot.
    fn facet<'a, F: ?Sized>(
        &'a self,
        supported: bool,
        accessor: impl FnOnce(&'a dyn GridDialect) -> Option<&'a F>,
        operation: &'static str,
    ) -> Result<&'a F, StoreError> {
        if !supported {
            return Err(StoreError::unsupported(self.name(), operation));
        }

        accessor(self.inner.as_ref()).ok_or_else(|| {
            StoreError::invariant(
                ErrorOrigin::Dialect,
                format!("dialect '{}' lost its {operation} facet after boot", self.name()),
            )
        })
    }

    // ---- core contract ----

    #[must_use]
    pub fn create_tuple(&self, metadata: &Arc<EntityKeyMetadata>, context: &TupleContext) -> Tuple {
        self.inner.create_tuple(metadata, context)
    }

    pub fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, StoreError> {
        self.inner.get_tuple(key, context)
    }

    pub fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<(), StoreError> {
        self.inner.insert_or_update_tuple(key, tuple, context)
    }

    pub fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<(), StoreError> {
        self.inner.remove_tuple(key, context)
    }

    #[must_use]
    pub fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Association {
        self.inner.create_association(key, context)
    }

    pub fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, StoreError> {
        self.inner.get_association(key, context)
    }

    pub fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), StoreError> {
        self.inner
            .insert_or_update_association(key, association, context)
    }

    pub fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), StoreError> {
        self.inner.remove_association(key, context)
    }

    #[must_use]
    pub fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        self.inner.is_stored_in_entity_structure(metadata, context)
    }

    pub fn next_value(&self, request: &NextValueRequest) -> Result<i64, StoreError> {
        self.inner.next_value(request)
    }

    #[must_use]
    pub fn duplicate_insert_prevention(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
    ) -> DuplicateInsertPrevention {
        self.inner.duplicate_insert_prevention(metadata)
    }

    pub fn for_each_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        type_context: &TupleTypeContext,
        consumer: &mut dyn FnMut(Tuple),
    ) -> Result<(), StoreError> {
        self.inner.for_each_tuple(metadata, type_context, consumer)
    }

    #[must_use]
    pub fn locking_strategy(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        mode: LockMode,
    ) -> Option<Box<dyn LockingStrategy>> {
        self.inner.locking_strategy(metadata, mode)
    }

    // ---- facet routing ----

    pub fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, StoreError> {
        self.facet(
            self.capabilities.multiget,
            GridDialect::as_multiget,
            "multiget reads",
        )?
        .get_tuples(keys, context)
    }

    pub fn insert_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<(), StoreError> {
        self.facet(
            self.capabilities.identity_column,
            GridDialect::as_identity_column_aware,
            "identity-column inserts",
        )?
        .insert_tuple(metadata, tuple, context)
    }

    pub fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, StoreError> {
        self.facet(
            self.capabilities.optimistic_locking,
            GridDialect::as_optimistic_locking_aware,
            "optimistic CAS writes",
        )?
        .update_tuple_with_optimistic_lock(key, old_lock_state, tuple, context)
    }

    pub fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, StoreError> {
        self.facet(
            self.capabilities.optimistic_locking,
            GridDialect::as_optimistic_locking_aware,
            "optimistic CAS writes",
        )?
        .remove_tuple_with_optimistic_lock(key, old_lock_state, context)
    }

    pub fn execute_batch(&self, queue: &mut OperationsQueue) -> Result<(), StoreError> {
        self.facet(
            self.capabilities.batch,
            GridDialect::as_batchable,
            "operation batching",
        )?
        .execute_batch(queue)
    }

    pub fn execute_native_query(
        &self,
        query: &NativeQuery,
        metadata: &Arc<EntityKeyMetadata>,
        context: &TupleContext,
    ) -> Result<Vec<Tuple>, StoreError> {
        self.facet(
            self.capabilities.query,
            GridDialect::as_queryable,
            "native queries",
        )?
        .execute_native_query(query, metadata, context)
    }
}

impl fmt::Debug for BoundDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundDialect")
            .field("dialect", &self.inner.name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

///
/// TESTS
///
