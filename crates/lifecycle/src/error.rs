//! Lifecycle error type.

use common::AggregateId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No lifecycle has been opened for the aggregate.
    #[error("no lifecycle for aggregate {0}")]
    UnknownAggregate(AggregateId),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
