use std::fmt;
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Structured failure raised at the dialect boundary, with a stable internal
/// classification. Absence of a tuple or association is never an error; read
/// operations return `Option` instead.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    /// Insert hit a uniqueness constraint enforced by the store.
    /// Distinct from generic failure so callers can retry with a different id.
    #[error("duplicate key for table '{table}': {key}")]
    DuplicateKey { table: String, key: String },

    /// Compare-and-swap found the stored row diverged from the expected
    /// lock state. Signals "retry with fresh state", not "operation failed".
    #[error("optimistic lock conflict on table '{table}': {key}")]
    OptimisticLockConflict { table: String, key: String },

    /// Pessimistic lock acquisition gave up after the configured wait.
    #[error("lock acquisition timed out on table '{table}': {key} (waited {waited_ms}ms)")]
    LockTimeout {
        table: String,
        key: String,
        waited_ms: u64,
    },

    /// A facet method was invoked on a dialect that does not provide the
    /// facet. Programming or configuration error; fatal, never retried.
    #[error("dialect '{dialect}' does not support {operation}")]
    UnsupportedOperation {
        dialect: String,
        operation: &'static str,
    },

    /// Row payload exceeds the store's bounded record size.
    #[error("record exceeds max size: {len} bytes (limit {limit})")]
    RecordTooLarge { len: usize, limit: usize },

    /// A value failed to encode into the dialect's wire format.
    #[error("codec failure: {message}")]
    Codec { message: String },

    /// A stored record failed to decode; the store holds bytes the codec
    /// no longer understands.
    #[error("corrupt record in table '{table}': {key}: {message}")]
    CorruptRecord {
        table: String,
        key: String,
        message: String,
    },

    /// Generic backend failure (network, driver, storage medium).
    #[error("backend failure: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A contract invariant was violated by the caller or the dialect.
    #[error("invariant violated ({origin}): {message}")]
    Invariant {
        origin: ErrorOrigin,
        message: String,
    },
}

impl StoreError {
    /// Construct a backend failure with no underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Construct a backend failure wrapping a driver-level error.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Construct a codec failure.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Construct an invariant violation for a specific origin.
    pub fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::Invariant {
            origin,
            message: message.into(),
        }
    }

    /// Construct an unsupported-facet error.
    pub fn unsupported(dialect: impl Into<String>, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            dialect: dialect.into(),
            operation,
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateKey { .. }
            | Self::OptimisticLockConflict { .. }
            | Self::LockTimeout { .. } => ErrorClass::Conflict,
            Self::UnsupportedOperation { .. } | Self::RecordTooLarge { .. } => {
                ErrorClass::Unsupported
            }
            Self::Codec { .. } | Self::Backend { .. } => ErrorClass::Internal,
            Self::CorruptRecord { .. } => ErrorClass::Corruption,
            Self::Invariant { .. } => ErrorClass::InvariantViolation,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::DuplicateKey { .. }
            | Self::OptimisticLockConflict { .. }
            | Self::LockTimeout { .. }
            | Self::RecordTooLarge { .. }
            | Self::CorruptRecord { .. }
            | Self::Backend { .. } => ErrorOrigin::Store,
            Self::UnsupportedOperation { .. } => ErrorOrigin::Dialect,
            Self::Codec { .. } => ErrorOrigin::Serialize,
            Self::Invariant { origin, .. } => *origin,
        }
    }

    /// True for the conflict family (duplicate key, stale CAS, lock timeout).
    /// Engines treat these as retryable at the transaction level.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class(), ErrorClass::Conflict)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Serialize,
    Store,
    Dialect,
    Flush,
    Model,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Serialize => "serialize",
            Self::Store => "store",
            Self::Dialect => "dialect",
            Self::Flush => "flush",
            Self::Model => "model",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_family_is_classified_uniformly() {
        let errors = [
            StoreError::DuplicateKey {
                table: "Order".into(),
                key: "[1]".into(),
            },
            StoreError::OptimisticLockConflict {
                table: "Order".into(),
                key: "[1]".into(),
            },
            StoreError::LockTimeout {
                table: "Order".into(),
                key: "[1]".into(),
                waited_ms: 50,
            },
        ];

        for err in errors {
            assert_eq!(err.class(), ErrorClass::Conflict);
            assert!(err.is_conflict());
        }
    }

    #[test]
    fn unsupported_carries_dialect_and_operation() {
        let err = StoreError::unsupported("map", "native queries");
        assert_eq!(err.class(), ErrorClass::Unsupported);
        assert_eq!(err.origin(), ErrorOrigin::Dialect);
        assert_eq!(err.to_string(), "dialect 'map' does not support native queries");
    }

    #[test]
    fn display_with_class_prefixes_origin_and_class() {
        let err = StoreError::codec("boom");
        assert_eq!(err.display_with_class(), "serialize:internal: codec failure: boom");
    }
}
