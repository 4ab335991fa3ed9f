use crate::{error::StoreError, model::EntityKey};
use std::{any::Any, fmt, time::Duration};

///
/// LockMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockMode {
    PessimisticRead,
    PessimisticWrite,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PessimisticRead => "pessimistic_read",
            Self::PessimisticWrite => "pessimistic_write",
        };
        write!(f, "{label}")
    }
}

///
/// LockingStrategy
///
/// Pessimistic locking as one store implements it for one entity type and
/// mode. Obtained from `GridDialect::locking_strategy`; a dialect
/// returning `None` there means locking is not enforced by the store,
/// which is not an error.
///

pub trait LockingStrategy: Send + Sync {
    fn mode(&self) -> LockMode;

    /// Acquire the lock, waiting up to `timeout`. A zero timeout tries
    /// once. Gives up with [`StoreError::LockTimeout`].
    fn lock_entity(&self, key: &EntityKey, timeout: Duration) -> Result<LockGuard, StoreError>;
}

///
/// LockGuard
///
/// Holds an acquired lock; releases it when dropped, on every exit path.
/// The payload is whatever the strategy needs to keep the lock alive.
///

pub struct LockGuard {
    _held: Box<dyn Any + Send>,
}

impl LockGuard {
    #[must_use]
    pub fn new(held: impl Any + Send) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}
