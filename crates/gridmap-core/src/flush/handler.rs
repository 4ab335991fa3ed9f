use crate::{error::StoreError, flush::ops::GridDialectOperation};
use tracing::warn;
use ulid::Ulid;

///
/// ErrorHandlingStrategy
///
/// The handler's verdict on one failed operation. `Continue` skips the
/// operation and lets the cycle proceed without surfacing the failure;
/// `Abort` stops the cycle, triggers the rollback notification, and lets
/// the original error propagate as the transaction-level failure.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorHandlingStrategy {
    Abort,
    Continue,
}

///
/// FailedOperationContext
///
/// What the handler learns about one failed operation: the operation
/// record and the error it failed with. Borrowed for the duration of the
/// callback; the cycle still owns both afterwards.
///

#[derive(Debug)]
pub struct FailedOperationContext<'a> {
    cycle_id: Ulid,
    operation: &'a GridDialectOperation,
    error: &'a StoreError,
}

impl<'a> FailedOperationContext<'a> {
    #[must_use]
    pub(crate) const fn new(
        cycle_id: Ulid,
        operation: &'a GridDialectOperation,
        error: &'a StoreError,
    ) -> Self {
        Self {
            cycle_id,
            operation,
            error,
        }
    }

    #[must_use]
    pub const fn cycle_id(&self) -> Ulid {
        self.cycle_id
    }

    #[must_use]
    pub const fn operation(&self) -> &GridDialectOperation {
        self.operation
    }

    #[must_use]
    pub const fn error(&self) -> &StoreError {
        self.error
    }
}

///
/// RollbackContext
///
/// Handed to the handler when a cycle rolls back: the operations already
/// applied to the datastore, in application order, owned by the handler
/// from here on. Non-transactional stores use this to compensate.
///

#[derive(Debug)]
pub struct RollbackContext {
    cycle_id: Ulid,
    applied: Vec<GridDialectOperation>,
}

impl RollbackContext {
    #[must_use]
    pub(crate) const fn new(cycle_id: Ulid, applied: Vec<GridDialectOperation>) -> Self {
        Self { cycle_id, applied }
    }

    #[must_use]
    pub const fn cycle_id(&self) -> Ulid {
        self.cycle_id
    }

    /// Applied operations in the order the datastore saw them.
    #[must_use]
    pub fn applied_operations(&self) -> &[GridDialectOperation] {
        &self.applied
    }

    #[must_use]
    pub fn into_applied_operations(self) -> Vec<GridDialectOperation> {
        self.applied
    }
}

///
/// ErrorHandler
///
/// Integrator hook into the flush-cycle error protocol. Handlers are
/// shared across sessions and invoked on the flushing thread.
///

pub trait ErrorHandler: Send + Sync {
    /// Decide what the cycle does about one failed operation.
    fn on_failed_operation(&self, context: FailedOperationContext<'_>) -> ErrorHandlingStrategy;

    /// Observe a rolled-back cycle and the operations it had applied.
    fn on_rollback(&self, context: RollbackContext);
}

///
/// AbortOnFailure
///
/// Default handler: abort on the first failed operation, log what had
/// been applied on rollback. The behavior integrators get when they
/// configure nothing.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct AbortOnFailure;

impl ErrorHandler for AbortOnFailure {
    fn on_failed_operation(&self, _context: FailedOperationContext<'_>) -> ErrorHandlingStrategy {
        ErrorHandlingStrategy::Abort
    }

    fn on_rollback(&self, context: RollbackContext) {
        warn!(
            cycle = %context.cycle_id(),
            applied = context.applied_operations().len(),
            "flush cycle rolled back"
        );
    }
}
