//! Stream processing for the order event log.
//!
//! This crate provides the orchestration side of the engine:
//! - [`DerivedOrderState`] folded from an order's events
//! - [`reaction_for`] the decision table mapping events to follow-on events
//! - [`StreamProcessor`] which subscribes to the log, maintains derived
//!   state, emits reactions with full causation metadata, and contains
//!   processing failures as EXCEPTION_RAISED events

pub mod error;
pub mod processor;
pub mod reactions;
pub mod state;

pub use error::{ProcessorError, Result};
pub use processor::{ProcessorStats, StreamProcessor};
pub use reactions::{Reaction, reaction_for};
pub use state::{DerivedOrderState, UNKNOWN_STATE, state_tag};
