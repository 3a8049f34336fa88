//! Derived order state folded from the event log.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_log::{Event, EventType, StateChangedData};
use serde::{Deserialize, Serialize};

/// State tag of an order before any event has been folded.
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// Maps a domain event type to the state tag it moves the order into.
///
/// Synthetic event types return `None`: STATE_CHANGED carries its target
/// state in the payload and EXCEPTION_RAISED leaves the tag untouched.
pub fn state_tag(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::OrderPlaced => Some("PLANNED"),
        EventType::InventoryChecked => Some("INVENTORY_VALIDATED"),
        EventType::PoGenerated => Some("PROCUREMENT_INITIATED"),
        EventType::MaterialReceived => Some("MATERIALS_AVAILABLE"),
        EventType::ProductionStarted => Some("IN_PRODUCTION"),
        EventType::QualityPassed => Some("QUALITY_APPROVED"),
        EventType::OrderShipped => Some("SHIPPED"),
        EventType::OrderDelivered => Some("DELIVERED"),
        EventType::OrderCancelled => Some("CANCELLED"),
        EventType::OrderReturned => Some("RETURNED"),
        EventType::StateChanged | EventType::ExceptionRaised => None,
    }
}

/// Current state of an order, derived by folding its events in append order.
///
/// The state tag stays an arbitrary string at this layer; the lifecycle
/// crate models the coarser phase machine on top of the same events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedOrderState {
    pub aggregate_id: AggregateId,
    pub current_state: String,
    pub last_updated: DateTime<Utc>,
    pub event_count: u64,
    pub last_event_type: Option<EventType>,
}

impl DerivedOrderState {
    /// Creates the initial state for an order with no folded events.
    pub fn new(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id,
            current_state: UNKNOWN_STATE.to_string(),
            last_updated: Utc::now(),
            event_count: 0,
            last_event_type: None,
        }
    }

    /// Folds one event into the state.
    ///
    /// Folding is total: malformed STATE_CHANGED payloads leave the tag
    /// unchanged rather than failing the fold.
    pub fn apply(&mut self, event: &Event) {
        match event.event_type {
            EventType::StateChanged => {
                if let Ok(data) =
                    serde_json::from_value::<StateChangedData>(event.payload.clone())
                {
                    self.current_state = data.new_state;
                }
            }
            EventType::ExceptionRaised => {}
            other => {
                if let Some(tag) = state_tag(other) {
                    self.current_state = tag.to_string();
                }
            }
        }

        self.event_count += 1;
        self.last_updated = event.timestamp;
        self.last_event_type = Some(event.event_type);
    }
}
