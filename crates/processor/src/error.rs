//! Processor error types.

use thiserror::Error;

/// Errors that can occur during stream processing.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// An error occurred in the event log.
    #[error("Event log error: {0}")]
    Log(#[from] event_log::EventLogError),
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;
