//! Recovery error types.
//!
//! Retry, breaker, and fallback outcomes are never errors; they surface as
//! tagged [`RecoveryResult`](crate::RecoveryResult) values so callers can
//! branch on them without unwinding. The only hard error in this crate is a
//! compensation request naming a template the registry does not hold.

use thiserror::Error;

use crate::compensation::CompensationKind;

/// Errors surfaced by recovery operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A compensation was requested for a template that is not registered.
    #[error("compensation template '{0}' is not registered")]
    UnknownTemplate(CompensationKind),
}

/// Failure reported by an attempted operation or a compensation step.
///
/// Carries only a message; the executor decides what happens next, so
/// operations do not need a structured error taxonomy of their own.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Convenience alias for recovery results.
pub type Result<T> = std::result::Result<T, RecoveryError>;
