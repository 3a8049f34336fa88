//! Append-only event log for the order orchestration engine.
//!
//! The log stores immutable domain events in append order, serves reads by
//! aggregate, type, and time range, and fans every append out to exact-type
//! and wildcard subscribers before the outermost `append` call returns.
//! Handler failures are contained by the log: counted, logged, and never
//! propagated to the appending caller or to other handlers.
//!
//! [`InMemoryEventLog`] is the reference implementation of the [`EventLog`]
//! contract; durable backends plug in behind the same trait.

pub mod error;
pub mod event;
pub mod janitor;
pub mod log;
pub mod memory;
pub mod payload;
pub mod query;

pub use common::AggregateId;
pub use error::{EventLogError, Result};
pub use event::{Event, EventBuilder, EventId, EventMetadata, EventType};
pub use janitor::{JanitorConfig, JanitorHandle, spawn_janitor};
pub use log::{
    EventHandler, EventLog, EventLogExt, EventStream, HandlerError, LogStats, Subscription,
    SubscriptionId, validate_event,
};
pub use memory::InMemoryEventLog;
pub use payload::{
    ExceptionRaisedData, InventoryCheckedData, MaterialReceivedData, OrderClosedData,
    OrderDeliveredData, OrderPlacedData, OrderShippedData, PoGeneratedData, ProductionStartedData,
    QualityPassedData, StateChangedData,
};
pub use query::EventQuery;
