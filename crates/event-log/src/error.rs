use thiserror::Error;

use common::AggregateId;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The event was rejected before storage.
    ///
    /// Raised for a nil event or aggregate id, or for a `causationId` that
    /// does not reference an already-appended event.
    #[error("Invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// The aggregate has no events in the log.
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventLogError {
    /// Convenience constructor for [`EventLogError::InvalidEvent`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
