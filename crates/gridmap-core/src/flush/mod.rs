pub mod handler;
pub mod ops;
pub mod queue;

pub use handler::{
    AbortOnFailure, ErrorHandler, ErrorHandlingStrategy, FailedOperationContext, RollbackContext,
};
pub use ops::GridDialectOperation;
pub use queue::{OperationsQueue, QueuedOperation};

use crate::{
    dialect::{
        BoundDialect,
        context::{AssociationContext, TupleContext},
    },
    error::{ErrorOrigin, StoreError},
    model::{Association, AssociationKey, EntityKey, EntityKeyMetadata, Tuple},
};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use ulid::Ulid;

///
/// FlushOutcome
///
/// What became of one write under the error protocol: applied to the
/// store, or skipped because the handler chose to continue past its
/// failure.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlushOutcome {
    Applied,
    Skipped,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CycleState {
    Open,
    Completed,
    RolledBack,
}

///
/// FlushCycle
///
/// One unit of session flushing against a dialect. Every write funnels
/// through the cycle so the error protocol sees it: successful operations
/// accumulate in an ordered applied log, failures are put to the handler,
/// and an abort (or a drop while still open) hands the log to the
/// handler's rollback callback for compensation.
///
/// Reads and id generation go straight to the [`BoundDialect`]; they
/// mutate nothing and play no part in compensation.
///

pub struct FlushCycle {
    dialect: BoundDialect,
    handler: Arc<dyn ErrorHandler>,
    id: Ulid,
    applied: Vec<GridDialectOperation>,
    state: CycleState,
}

impl FlushCycle {
    #[must_use]
    pub fn new(dialect: BoundDialect, handler: Arc<dyn ErrorHandler>) -> Self {
        let id = Ulid::new();
        debug!(cycle = %id, dialect = dialect.name(), "flush cycle opened");

        Self {
            dialect,
            handler,
            id,
            applied: Vec::new(),
            state: CycleState::Open,
        }
    }

    /// Cycle with the abort-on-first-failure handler.
    #[must_use]
    pub fn with_default_handler(dialect: BoundDialect) -> Self {
        Self::new(dialect, Arc::new(AbortOnFailure))
    }

    #[must_use]
    pub const fn id(&self) -> Ulid {
        self.id
    }

    #[must_use]
    pub const fn dialect(&self) -> &BoundDialect {
        &self.dialect
    }

    /// Operations applied so far, in the order the datastore saw them.
    #[must_use]
    pub fn applied_operations(&self) -> &[GridDialectOperation] {
        &self.applied
    }

    // ---- tuple writes ----

    /// Fresh in-memory tuple for a row about to be inserted. Touches no
    /// datastore state; recorded so handlers see the full cycle.
    pub fn create_tuple(
        &mut self,
        metadata: &Arc<EntityKeyMetadata>,
        context: &TupleContext,
    ) -> Result<Tuple, StoreError> {
        self.ensure_open()?;

        let tuple = self.dialect.create_tuple(metadata, context);
        self.record(GridDialectOperation::CreateTuple {
            metadata: Arc::clone(metadata),
        });

        Ok(tuple)
    }

    pub fn insert_or_update_tuple(
        &mut self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::InsertOrUpdateTuple {
            key: key.clone(),
            tuple: tuple.clone(),
        };

        self.apply(operation, |dialect| {
            dialect.insert_or_update_tuple(key, tuple, context)
        })
    }

    /// Identity-column insert. The record carries the tuple as handed to
    /// the store; the generated id lands in `tuple` afterwards.
    pub fn insert_tuple(
        &mut self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::InsertTuple {
            metadata: Arc::clone(metadata),
            tuple: tuple.clone(),
        };

        self.apply(operation, |dialect| {
            dialect.insert_tuple(metadata, tuple, context)
        })
    }

    pub fn remove_tuple(
        &mut self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::RemoveTuple { key: key.clone() };

        self.apply(operation, |dialect| dialect.remove_tuple(key, context))
    }

    pub fn update_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::UpdateTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
            tuple: tuple.clone(),
        };

        self.apply(operation, |dialect| {
            if dialect.update_tuple_with_optimistic_lock(key, old_lock_state, tuple, context)? {
                Ok(())
            } else {
                Err(cas_conflict(key))
            }
        })
    }

    pub fn remove_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::RemoveTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
        };

        self.apply(operation, |dialect| {
            if dialect.remove_tuple_with_optimistic_lock(key, old_lock_state, context)? {
                Ok(())
            } else {
                Err(cas_conflict(key))
            }
        })
    }

    // ---- association writes ----

    /// Fresh in-memory association. Touches no datastore state.
    pub fn create_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, StoreError> {
        self.ensure_open()?;

        let association = self.dialect.create_association(key, context);
        self.record(GridDialectOperation::CreateAssociationWithKey { key: key.clone() });

        Ok(association)
    }

    pub fn insert_or_update_association(
        &mut self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::InsertOrUpdateAssociation {
            key: key.clone(),
            association: association.clone(),
        };

        self.apply(operation, |dialect| {
            dialect.insert_or_update_association(key, association, context)
        })
    }

    pub fn remove_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::RemoveAssociation { key: key.clone() };

        self.apply(operation, |dialect| {
            dialect.remove_association(key, context)
        })
    }

    // ---- batching ----

    /// Hand a queue of deferred writes to the batch facet. The record
    /// snapshots the queue before the dialect drains it, so a failure
    /// reports the full intended batch.
    pub fn execute_batch(&mut self, queue: &mut OperationsQueue) -> Result<FlushOutcome, StoreError> {
        let operation = GridDialectOperation::ExecuteBatch {
            operations: queue.iter().map(Into::into).collect(),
        };

        self.apply(operation, |dialect| dialect.execute_batch(queue))
    }

    // ---- lifecycle ----

    /// Close the cycle after a successful flush. No handler callback.
    pub fn complete(mut self) {
        if self.state == CycleState::Open {
            self.state = CycleState::Completed;
            debug!(cycle = %self.id, applied = self.applied.len(), "flush cycle completed");
        }
    }

    /// Roll the cycle back explicitly, handing the applied log to the
    /// handler for compensation.
    pub fn rollback(mut self) {
        self.rollback_now();
    }

    // ---- internals ----

    fn apply(
        &mut self,
        operation: GridDialectOperation,
        call: impl FnOnce(&BoundDialect) -> Result<(), StoreError>,
    ) -> Result<FlushOutcome, StoreError> {
        self.ensure_open()?;

        match call(&self.dialect) {
            Ok(()) => {
                self.record(operation);
                Ok(FlushOutcome::Applied)
            }
            Err(error) => {
                let verdict = self
                    .handler
                    .on_failed_operation(FailedOperationContext::new(self.id, &operation, &error));

                match verdict {
                    ErrorHandlingStrategy::Continue => {
                        warn!(
                            cycle = %self.id,
                            op = %operation,
                            error = %error,
                            "operation failed, continuing per handler"
                        );
                        Ok(FlushOutcome::Skipped)
                    }
                    ErrorHandlingStrategy::Abort => {
                        self.rollback_now();
                        Err(error)
                    }
                }
            }
        }
    }

    fn record(&mut self, operation: GridDialectOperation) {
        trace!(cycle = %self.id, op = %operation, "applied");
        self.applied.push(operation);
    }

    fn rollback_now(&mut self) {
        if self.state != CycleState::Open {
            return;
        }
        self.state = CycleState::RolledBack;

        let applied = std::mem::take(&mut self.applied);
        debug!(cycle = %self.id, applied = applied.len(), "flush cycle rolling back");
        self.handler.on_rollback(RollbackContext::new(self.id, applied));
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.state == CycleState::Open {
            Ok(())
        } else {
            Err(StoreError::invariant(
                ErrorOrigin::Flush,
                "flush cycle used after completion or rollback",
            ))
        }
    }
}

impl Drop for FlushCycle {
    fn drop(&mut self) {
        // a cycle abandoned mid-flight still owes the handler its log
        self.rollback_now();
    }
}

fn cas_conflict(key: &EntityKey) -> StoreError {
    StoreError::OptimisticLockConflict {
        table: key.table().to_string(),
        key: key.values_display(),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialect::{
            GridDialect, OptimisticLockingAwareGridDialect,
            context::{TupleContext, TupleTypeContext},
        },
        model::Value,
        options::OptionsRegistry,
    };
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::Mutex,
    };

    /// In-memory dialect that fails writes to scripted keys.
    #[derive(Default)]
    struct ScriptedDialect {
        rows: Mutex<BTreeMap<EntityKey, BTreeMap<String, Value>>>,
        fail_on: BTreeSet<EntityKey>,
    }

    impl ScriptedDialect {
        fn failing_on(keys: impl IntoIterator<Item = EntityKey>) -> Self {
            Self {
                rows: Mutex::new(BTreeMap::new()),
                fail_on: keys.into_iter().collect(),
            }
        }

        fn contains(&self, key: &EntityKey) -> bool {
            self.rows.lock().unwrap().contains_key(key)
        }
    }

    impl GridDialect for ScriptedDialect {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn get_tuple(
            &self,
            key: &EntityKey,
            _context: &TupleContext,
        ) -> Result<Option<Tuple>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .map(Tuple::from_snapshot))
        }

        fn insert_or_update_tuple(
            &self,
            key: &EntityKey,
            tuple: &Tuple,
            _context: &TupleContext,
        ) -> Result<(), StoreError> {
            if self.fail_on.contains(key) {
                return Err(StoreError::backend("scripted write failure"));
            }

            let mut rows = self.rows.lock().unwrap();
            let row = rows.entry(key.clone()).or_default();
            tuple.apply_ops_to(row);

            Ok(())
        }

        fn remove_tuple(
            &self,
            key: &EntityKey,
            _context: &TupleContext,
        ) -> Result<(), StoreError> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }

        fn get_association(
            &self,
            _key: &AssociationKey,
            _context: &AssociationContext,
        ) -> Result<Option<Association>, StoreError> {
            Ok(None)
        }

        fn insert_or_update_association(
            &self,
            _key: &AssociationKey,
            _association: &Association,
            _context: &AssociationContext,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn remove_association(
            &self,
            _key: &AssociationKey,
            _context: &AssociationContext,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn next_value(&self, request: &crate::id::NextValueRequest) -> Result<i64, StoreError> {
            Ok(request.initial_value())
        }

        fn for_each_tuple(
            &self,
            _metadata: &Arc<EntityKeyMetadata>,
            _type_context: &TupleTypeContext,
            _consumer: &mut dyn FnMut(Tuple),
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
            Some(self)
        }
    }

    impl OptimisticLockingAwareGridDialect for ScriptedDialect {
        fn update_tuple_with_optimistic_lock(
            &self,
            key: &EntityKey,
            old_lock_state: &Tuple,
            tuple: &Tuple,
            _context: &TupleContext,
        ) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get_mut(key) else {
                return Ok(false);
            };

            for column in old_lock_state.column_names() {
                if row.get(column) != old_lock_state.get(column) {
                    return Ok(false);
                }
            }
            tuple.apply_ops_to(row);

            Ok(true)
        }

        fn remove_tuple_with_optimistic_lock(
            &self,
            key: &EntityKey,
            old_lock_state: &Tuple,
            _context: &TupleContext,
        ) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get(key) else {
                return Ok(false);
            };

            for column in old_lock_state.column_names() {
                if row.get(column) != old_lock_state.get(column) {
                    return Ok(false);
                }
            }
            rows.remove(key);

            Ok(true)
        }
    }

    /// Handler that records every callback for assertions.
    struct RecordingHandler {
        verdict: ErrorHandlingStrategy,
        failed: Mutex<Vec<String>>,
        rollbacks: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingHandler {
        fn with_verdict(verdict: ErrorHandlingStrategy) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                failed: Mutex::new(Vec::new()),
                rollbacks: Mutex::new(Vec::new()),
            })
        }

        fn failed_labels(&self) -> Vec<String> {
            self.failed.lock().unwrap().clone()
        }

        fn rollbacks(&self) -> Vec<Vec<String>> {
            self.rollbacks.lock().unwrap().clone()
        }
    }

    impl ErrorHandler for RecordingHandler {
        fn on_failed_operation(&self, context: FailedOperationContext<'_>) -> ErrorHandlingStrategy {
            self.failed
                .lock()
                .unwrap()
                .push(context.operation().to_string());
            self.verdict
        }

        fn on_rollback(&self, context: RollbackContext) {
            self.rollbacks.lock().unwrap().push(
                context
                    .applied_operations()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            );
        }
    }

    fn key(id: i64) -> EntityKey {
        let metadata = Arc::new(EntityKeyMetadata::try_new("Order", ["id"]).unwrap());
        EntityKey::try_new(metadata, vec![Value::Int(id)]).unwrap()
    }

    fn ctx() -> TupleContext {
        TupleContext::new(Arc::new(TupleTypeContext::new(
            "Order",
            ["id", "total"],
            Arc::new(OptionsRegistry::default()),
        )))
    }

    fn tuple(total: i64) -> Tuple {
        let mut tuple = Tuple::for_insert();
        tuple.put("total", total);
        tuple
    }

    #[test]
    fn abort_reports_failure_then_rolls_back_applied_prefix() {
        let dialect = Arc::new(ScriptedDialect::failing_on([key(2)]));
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Abort);
        let mut cycle = FlushCycle::new(
            BoundDialect::new(dialect.clone()),
            handler.clone(),
        );

        assert_eq!(
            cycle.insert_or_update_tuple(&key(1), &tuple(10), &ctx()).unwrap(),
            FlushOutcome::Applied
        );

        let err = cycle
            .insert_or_update_tuple(&key(2), &tuple(20), &ctx())
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));

        // failure callback saw exactly the failed operation
        assert_eq!(handler.failed_labels(), ["insert_or_update_tuple(Order[2])"]);

        // rollback fired immediately, with the applied prefix only
        assert_eq!(
            handler.rollbacks(),
            [vec!["insert_or_update_tuple(Order[1])".to_string()]]
        );

        // later writes never reach the dialect
        let err = cycle
            .insert_or_update_tuple(&key(3), &tuple(30), &ctx())
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant { .. }));
        assert!(!dialect.contains(&key(3)));
    }

    #[test]
    fn continue_skips_failed_operation_and_cycle_proceeds() {
        let dialect = Arc::new(ScriptedDialect::failing_on([key(2)]));
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Continue);
        let mut cycle = FlushCycle::new(
            BoundDialect::new(dialect.clone()),
            handler.clone(),
        );

        assert_eq!(
            cycle.insert_or_update_tuple(&key(1), &tuple(10), &ctx()).unwrap(),
            FlushOutcome::Applied
        );
        assert_eq!(
            cycle.insert_or_update_tuple(&key(2), &tuple(20), &ctx()).unwrap(),
            FlushOutcome::Skipped
        );
        assert_eq!(
            cycle.insert_or_update_tuple(&key(3), &tuple(30), &ctx()).unwrap(),
            FlushOutcome::Applied
        );

        cycle.complete();

        assert!(handler.rollbacks().is_empty());
        assert!(dialect.contains(&key(1)));
        assert!(!dialect.contains(&key(2)));
        assert!(dialect.contains(&key(3)));

        // skipped operations never join the applied log
        assert_eq!(handler.failed_labels().len(), 1);
    }

    #[test]
    fn stale_cas_maps_to_conflict_and_aborts() {
        let dialect = Arc::new(ScriptedDialect::default());
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Abort);
        let mut cycle = FlushCycle::new(
            BoundDialect::new(dialect.clone()),
            handler.clone(),
        );

        cycle
            .insert_or_update_tuple(&key(1), &tuple(10), &ctx())
            .unwrap();

        let err = cycle
            .update_tuple_with_optimistic_lock(&key(1), &tuple(99), &tuple(11), &ctx())
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(err, StoreError::OptimisticLockConflict { .. }));

        // the conflict went through the full protocol
        assert_eq!(handler.failed_labels().len(), 1);
        assert_eq!(handler.rollbacks().len(), 1);
    }

    #[test]
    fn fresh_cas_succeeds_when_lock_state_matches() {
        let dialect = Arc::new(ScriptedDialect::default());
        let mut cycle =
            FlushCycle::with_default_handler(BoundDialect::new(dialect.clone()));

        cycle
            .insert_or_update_tuple(&key(1), &tuple(10), &ctx())
            .unwrap();

        let outcome = cycle
            .update_tuple_with_optimistic_lock(&key(1), &tuple(10), &tuple(11), &ctx())
            .unwrap();
        assert_eq!(outcome, FlushOutcome::Applied);

        let stored = dialect.get_tuple(&key(1), &ctx()).unwrap().unwrap();
        assert_eq!(stored.get("total"), Some(&Value::Int(11)));

        cycle.complete();
    }

    #[test]
    fn dropping_an_open_cycle_notifies_rollback() {
        let dialect = Arc::new(ScriptedDialect::default());
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Abort);

        {
            let mut cycle = FlushCycle::new(
                BoundDialect::new(dialect.clone()),
                handler.clone(),
            );
            cycle
                .insert_or_update_tuple(&key(1), &tuple(10), &ctx())
                .unwrap();
        }

        assert_eq!(
            handler.rollbacks(),
            [vec!["insert_or_update_tuple(Order[1])".to_string()]]
        );
    }

    #[test]
    fn completed_cycle_stays_silent() {
        let dialect = Arc::new(ScriptedDialect::default());
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Abort);

        let mut cycle = FlushCycle::new(
            BoundDialect::new(dialect.clone()),
            handler.clone(),
        );
        cycle
            .insert_or_update_tuple(&key(1), &tuple(10), &ctx())
            .unwrap();
        cycle.complete();

        assert!(handler.rollbacks().is_empty());
    }

    #[test]
    fn explicit_rollback_hands_over_the_applied_log() {
        let dialect = Arc::new(ScriptedDialect::default());
        let handler = RecordingHandler::with_verdict(ErrorHandlingStrategy::Abort);

        let mut cycle = FlushCycle::new(
            BoundDialect::new(dialect.clone()),
            handler.clone(),
        );
        cycle
            .insert_or_update_tuple(&key(1), &tuple(10), &ctx())
            .unwrap();
        cycle
            .remove_tuple(&key(1), &ctx())
            .unwrap();
        cycle.rollback();

        assert_eq!(
            handler.rollbacks(),
            [vec![
                "insert_or_update_tuple(Order[1])".to_string(),
                "remove_tuple(Order[1])".to_string(),
            ]]
        );
    }
}
