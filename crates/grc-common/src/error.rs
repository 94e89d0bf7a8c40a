//! Error taxonomy for the GRC core
//!
//! The scheduler branches on [`ErrorKind`], not on error types: agents
//! classify failures at emission and the kind decides retry behavior.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed failure classification carried on task results and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Requested entity does not exist
    NotFound,
    /// Policy denied the operation
    AccessDenied,
    /// Hash verification or canonicalisation failed
    IntegrityError,
    /// Encrypt/decrypt failed or key missing
    EncryptionError,
    /// Queue or cache full; retry with delay
    Backpressure,
    /// Deadline exceeded
    Timeout,
    /// Downstream I/O failure presumed recoverable
    Transient,
    /// Deterministic failure, retries useless
    Permanent,
    /// ETL validation rule failed
    ValidationFailed,
    /// Second start attempt on a running pipeline
    AlreadyRunning,
}

impl ErrorKind {
    /// Whether the scheduler should retry a task failed with this kind
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Transient)
    }
}

/// Core error type surfaced by every subsystem
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Policy denied the operation
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Hash verification or canonicalisation failed
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Encrypt/decrypt failed or key missing
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Bounded queue or cache rejected the write
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// Deadline exceeded
    #[error("timeout: {0}")]
    Timeout(String),

    /// Recoverable downstream failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// Deterministic failure
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Validation rule rejected the data
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Pipeline is already running
    #[error("already running: {0}")]
    AlreadyRunning(String),
}

impl CoreError {
    /// The taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::AccessDenied(_) => ErrorKind::AccessDenied,
            CoreError::Integrity(_) => ErrorKind::IntegrityError,
            CoreError::Encryption(_) => ErrorKind::EncryptionError,
            CoreError::Backpressure(_) => ErrorKind::Backpressure,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Transient(_) => ErrorKind::Transient,
            CoreError::Permanent(_) => ErrorKind::Permanent,
            CoreError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            CoreError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
        }
    }
}

/// Result alias used across the core
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(!ErrorKind::AccessDenied.is_retryable());
        assert!(!ErrorKind::Backpressure.is_retryable());
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = CoreError::Timeout("deadline at 100ms".into());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.kind().is_retryable());
        let err = CoreError::AccessDenied("scope is private".into());
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }
}
