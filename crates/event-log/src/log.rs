use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::AggregateId;

use crate::error::{EventLogError, Result};
use crate::event::{Event, EventType};
use crate::query::EventQuery;

/// A stream of events, in append order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Channel a handler is subscribed to: one exact event type, or every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    Type(EventType),
    All,
}

impl Subscription {
    /// Returns the channel name, `*` for the wildcard.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subscription::Type(event_type) => event_type.as_str(),
            Subscription::All => "*",
        }
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned by an event handler.
///
/// The log contains handler errors: they are counted and logged, never
/// propagated to the appending caller or to other handlers.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// A subscriber invoked synchronously for every delivered event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in containment logs.
    fn name(&self) -> &str;

    /// Handles one delivered event.
    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError>;
}

/// Counters describing the log's contents and subscribers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_events: u64,
    pub events_by_type: HashMap<EventType, u64>,
    pub subscriber_count: usize,
    pub handler_failures: u64,
}

/// Core contract for the append-only event log.
///
/// Appended events become visible to all reads and are delivered to
/// exact-type and wildcard subscribers in append order before the outermost
/// `append` returns. Implementations must be thread-safe, and no event is
/// ever deleted through this trait; retention is a janitor policy applied
/// outside the contract.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends one event.
    ///
    /// Fails with [`EventLogError::InvalidEvent`] when the event or aggregate
    /// id is nil, or when `causationId` references an id that has not been
    /// appended yet.
    async fn append(&self, event: Event) -> Result<()>;

    /// All events for an aggregate, in append order.
    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<Event>>;

    /// All events of one type, in append order.
    async fn events_of_type(&self, event_type: EventType) -> Result<Vec<Event>>;

    /// All events recorded within `[start, end]`, in append order.
    async fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Events matching a query, in append order.
    async fn query(&self, query: EventQuery) -> Result<Vec<Event>>;

    /// Streams every event in append order, for replay.
    async fn stream_all(&self) -> Result<EventStream>;

    /// Registers a handler for future appends on the given channel.
    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId;

    /// Removes a handler. Returns false when the id was not registered on
    /// that channel.
    async fn unsubscribe(&self, subscription: Subscription, id: SubscriptionId) -> bool;

    /// Current log statistics.
    async fn stats(&self) -> LogStats;
}

/// Extension trait providing convenience methods for event logs.
#[async_trait]
pub trait EventLogExt: EventLog {
    /// Appends a batch of events one at a time, preserving order.
    async fn append_all(&self, events: Vec<Event>) -> Result<()> {
        for event in events {
            self.append(event).await?;
        }
        Ok(())
    }

    /// Checks whether an aggregate has any events.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(!self.events_for(aggregate_id).await?.is_empty())
    }
}

// Blanket implementation for all EventLog implementations
impl<T: EventLog + ?Sized> EventLogExt for T {}

/// Validates an event before storage.
///
/// Causation references require store access and are checked by the
/// implementation during append.
pub fn validate_event(event: &Event) -> Result<()> {
    if event.event_id.is_nil() {
        return Err(EventLogError::invalid("missing event id"));
    }
    if event.aggregate_id.is_nil() {
        return Err(EventLogError::invalid("missing aggregate id"));
    }
    Ok(())
}
