use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{AggregateId, CorrelationId, OrganizationId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true for the nil UUID, which is rejected on append.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// The closed set of event types recorded by the engine.
///
/// Wire names are the SCREAMING_SNAKE_CASE tags of the order vocabulary
/// (`ORDER_PLACED`, `INVENTORY_CHECKED`, ...). `StateChanged` and
/// `ExceptionRaised` are synthesized by the stream processor; the rest are
/// domain facts appended by callers or by reaction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderPlaced,
    InventoryChecked,
    PoGenerated,
    MaterialReceived,
    ProductionStarted,
    QualityPassed,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    OrderReturned,
    StateChanged,
    ExceptionRaised,
}

impl EventType {
    /// All event types, in chain order first, then terminals and synthetics.
    pub const ALL: [EventType; 12] = [
        EventType::OrderPlaced,
        EventType::InventoryChecked,
        EventType::PoGenerated,
        EventType::MaterialReceived,
        EventType::ProductionStarted,
        EventType::QualityPassed,
        EventType::OrderShipped,
        EventType::OrderDelivered,
        EventType::OrderCancelled,
        EventType::OrderReturned,
        EventType::StateChanged,
        EventType::ExceptionRaised,
    ];

    /// Returns the wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderPlaced => "ORDER_PLACED",
            EventType::InventoryChecked => "INVENTORY_CHECKED",
            EventType::PoGenerated => "PO_GENERATED",
            EventType::MaterialReceived => "MATERIAL_RECEIVED",
            EventType::ProductionStarted => "PRODUCTION_STARTED",
            EventType::QualityPassed => "QUALITY_PASSED",
            EventType::OrderShipped => "ORDER_SHIPPED",
            EventType::OrderDelivered => "ORDER_DELIVERED",
            EventType::OrderCancelled => "ORDER_CANCELLED",
            EventType::OrderReturned => "ORDER_RETURNED",
            EventType::StateChanged => "STATE_CHANGED",
            EventType::ExceptionRaised => "EXCEPTION_RAISED",
        }
    }

    /// True for events synthesized by the stream processor rather than
    /// recorded as domain facts.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, EventType::StateChanged | EventType::ExceptionRaised)
    }

    /// Parses a wire name back into an event type.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata stamped on every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Payload schema version, for forward-compatible consumers.
    pub schema_version: u32,
    /// Component that produced the event.
    pub source_component: String,
    /// Identifier shared by all events of one business flow.
    pub correlation_id: CorrelationId,
    /// Id of the event that directly caused this one, if any.
    ///
    /// Must reference an event appended no later than this one.
    pub causation_id: Option<EventId>,
}

impl EventMetadata {
    /// Creates metadata for a flow-starting event with a fresh correlation id.
    pub fn new(source_component: impl Into<String>) -> Self {
        Self {
            schema_version: 1,
            source_component: source_component.into(),
            correlation_id: CorrelationId::new(),
            causation_id: None,
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("engine")
    }
}

/// An immutable domain event.
///
/// The payload is opaque to the log; consumers deserialize it into the typed
/// structures in [`crate::payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The aggregate (order) this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of the event.
    pub event_type: EventType,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,

    /// Tenant the order belongs to.
    pub organization_id: OrganizationId,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Causation, correlation, and provenance metadata.
    pub metadata: EventMetadata,
}

impl Event {
    /// Creates a new event builder.
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }
}

/// Builder for constructing events.
#[derive(Debug, Default)]
pub struct EventBuilder {
    event_id: Option<EventId>,
    event_type: Option<EventType>,
    aggregate_id: Option<AggregateId>,
    timestamp: Option<DateTime<Utc>>,
    organization_id: Option<OrganizationId>,
    payload: Option<serde_json::Value>,
    metadata: Option<EventMetadata>,
}

impl EventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the organization. If not set, the default organization is used.
    pub fn organization_id(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the full metadata record.
    pub fn metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the source component on the metadata.
    pub fn source_component(mut self, source: impl Into<String>) -> Self {
        let mut metadata = self.metadata.take().unwrap_or_default();
        metadata.source_component = source.into();
        self.metadata = Some(metadata);
        self
    }

    /// Sets the correlation id on the metadata.
    pub fn correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        let mut metadata = self.metadata.take().unwrap_or_default();
        metadata.correlation_id = correlation_id;
        self.metadata = Some(metadata);
        self
    }

    /// Sets the causation id on the metadata.
    pub fn causation_id(mut self, causation_id: EventId) -> Self {
        let mut metadata = self.metadata.take().unwrap_or_default();
        metadata.causation_id = Some(causation_id);
        self.metadata = Some(metadata);
        self
    }

    /// Stamps this event as a follow-on of `trigger`: same aggregate and
    /// organization, inherited correlation id, causation id set to the
    /// trigger's event id.
    pub fn caused_by(self, trigger: &Event) -> Self {
        self.aggregate_id(trigger.aggregate_id)
            .organization_id(trigger.organization_id.clone())
            .correlation_id(trigger.metadata.correlation_id)
            .causation_id(trigger.event_id)
    }

    /// Builds the event.
    ///
    /// # Panics
    ///
    /// Panics if required fields (event_type, aggregate_id, payload) are not
    /// set.
    pub fn build(self) -> Event {
        Event {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.expect("event_type is required"),
            aggregate_id: self.aggregate_id.expect("aggregate_id is required"),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            organization_id: self.organization_id.unwrap_or_default(),
            payload: self.payload.expect("payload is required"),
            metadata: self.metadata.unwrap_or_default(),
        }
    }

    /// Tries to build the event, returning None if required fields are
    /// missing.
    pub fn try_build(self) -> Option<Event> {
        Some(Event {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            aggregate_id: self.aggregate_id?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            organization_id: self.organization_id.unwrap_or_default(),
            payload: self.payload?,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn event_type_wire_names_roundtrip() {
        for event_type in EventType::ALL {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
            let parsed: EventType = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, event_type);
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("NOT_A_TYPE"), None);
    }

    #[test]
    fn synthetic_types_are_flagged() {
        assert!(EventType::StateChanged.is_synthetic());
        assert!(EventType::ExceptionRaised.is_synthetic());
        assert!(!EventType::OrderPlaced.is_synthetic());
    }

    #[test]
    fn event_builder_fills_defaults() {
        let aggregate_id = AggregateId::new();
        let payload = serde_json::json!({"orderNumber": "ORD-1"});

        let event = Event::builder()
            .event_type(EventType::OrderPlaced)
            .aggregate_id(aggregate_id)
            .payload_raw(payload.clone())
            .source_component("api")
            .build();

        assert_eq!(event.event_type, EventType::OrderPlaced);
        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.payload, payload);
        assert_eq!(event.organization_id, OrganizationId::default());
        assert_eq!(event.metadata.source_component, "api");
        assert_eq!(event.metadata.schema_version, 1);
        assert!(event.metadata.causation_id.is_none());
        assert!(!event.event_id.is_nil());
    }

    #[test]
    fn event_builder_try_build_returns_none_on_missing_fields() {
        assert!(Event::builder().try_build().is_none());
        assert!(
            Event::builder()
                .event_type(EventType::OrderPlaced)
                .try_build()
                .is_none()
        );
    }

    #[test]
    fn caused_by_inherits_flow_identity() {
        let trigger = Event::builder()
            .event_type(EventType::OrderPlaced)
            .aggregate_id(AggregateId::new())
            .organization_id(OrganizationId::new("org-7"))
            .payload_raw(serde_json::json!({}))
            .build();

        let follow_on = Event::builder()
            .event_type(EventType::InventoryChecked)
            .payload_raw(serde_json::json!({}))
            .caused_by(&trigger)
            .build();

        assert_eq!(follow_on.aggregate_id, trigger.aggregate_id);
        assert_eq!(follow_on.organization_id, trigger.organization_id);
        assert_eq!(
            follow_on.metadata.correlation_id,
            trigger.metadata.correlation_id
        );
        assert_eq!(follow_on.metadata.causation_id, Some(trigger.event_id));
        assert_ne!(follow_on.event_id, trigger.event_id);
    }

    #[test]
    fn event_serializes_with_camel_case_keys() {
        let event = Event::builder()
            .event_type(EventType::StateChanged)
            .aggregate_id(AggregateId::new())
            .payload_raw(serde_json::json!({"newState": "PLANNED"}))
            .build();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "STATE_CHANGED");
        assert!(json["eventId"].is_string());
        assert!(json["aggregateId"].is_string());
        assert!(json["metadata"]["correlationId"].is_string());
        assert!(json["metadata"]["causationId"].is_null());
    }
}
