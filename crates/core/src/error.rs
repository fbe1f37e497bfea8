//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a local, synchronous contract violation by the caller.
/// Nothing here is transient, so nothing here is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value object's props failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identity snapshot could not be restored.
    #[error("invalid identity snapshot: {0}")]
    InvalidSnapshot(String),

    /// A write-once business key slot was assigned a second time.
    #[error("{0} is already set")]
    AlreadySet(&'static str),

    /// A business key was absent (null) where a key was required.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A write was attempted on a frozen value node.
    #[error("cannot modify frozen {0}")]
    Frozen(&'static str),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Self::InvalidSnapshot(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn already_set(slot: &'static str) -> Self {
        Self::AlreadySet(slot)
    }

    pub fn frozen(kind: &'static str) -> Self {
        Self::Frozen(kind)
    }

    /// Whether this error came out of a value object's validation hook.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
