use chrono::{DateTime, Utc};

use common::{AggregateId, OrganizationId};

use crate::event::{Event, EventType};

/// Query criteria for reading events.
///
/// All criteria are optional and combined with AND. Timestamp bounds are
/// inclusive on both ends.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,
    pub event_types: Option<Vec<EventType>>,
    pub organization_id: Option<OrganizationId>,
    pub from_timestamp: Option<DateTime<Utc>>,
    pub to_timestamp: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates an empty query that matches all events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Filters by a single event type.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_types.get_or_insert_with(Vec::new).push(event_type);
        self
    }

    /// Filters by a set of event types.
    pub fn event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Filters by organization.
    pub fn organization_id(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Filters events recorded at or after the given time.
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters events recorded at or before the given time.
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true when the event satisfies every criterion.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(id) = self.aggregate_id
            && event.aggregate_id != id
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }
        if let Some(ref org) = self.organization_id
            && &event.organization_id != org
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && event.timestamp > to
        {
            return false;
        }
        true
    }
}
