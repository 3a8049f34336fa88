//! Order lifecycle tracking on top of the event log.
//!
//! The [`LifecycleManager`] subscribes to the log and maintains a phase view
//! of every order: seven phases from Order Creation to Post-Delivery, each
//! with an owning team, an exit edge triggered by a domain event, and entry
//! actions run against external collaborators (rule engine, MRP planning,
//! notifications). Facts extracted from event payloads gate the edges;
//! failed actions surface as blockers that hold the order in place until
//! resolved.

pub mod collaborators;
pub mod error;
pub mod facts;
pub mod manager;
pub mod phase;
pub mod state;

pub use collaborators::{
    ChannelMessage, InMemoryMrpEngine, InMemoryNotifier, InMemoryRuleEngine, MaterialPlan,
    MrpEngine, Notifier, RuleEngine, TracingNotifier, ValidationResult,
};
pub use error::{LifecycleError, Result};
pub use facts::PhaseData;
pub use manager::{Collaborators, LifecycleManager, PhaseEventKind};
pub use phase::{
    Phase, PhaseAction, PhaseStatus, PhaseTransition, Precondition, TRANSITIONS, transition_from,
    transition_to,
};
pub use state::{LifecycleState, LifecycleStats, OrderDetails, PhaseHistoryEntry};
