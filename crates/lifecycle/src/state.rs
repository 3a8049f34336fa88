//! Per-order lifecycle state and its wire representations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::{AggregateId, OrganizationId, Priority};

use crate::facts::PhaseData;
use crate::phase::{Phase, PhaseStatus, TRANSITIONS};

/// Commercial details captured from the order placement payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_number: String,
    pub customer_name: Option<String>,
    pub priority: Priority,
    pub total_value: Option<f64>,
    pub total_items: Option<u64>,
    pub warehouse: Option<String>,
    pub external_id: Option<String>,
}

impl OrderDetails {
    /// Extracts order details from an ORDER_PLACED payload.
    ///
    /// The order number falls back to the aggregate id when the payload
    /// does not carry one.
    pub fn from_payload(aggregate_id: AggregateId, payload: &Value) -> Self {
        let str_field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            order_number: str_field("orderNumber")
                .unwrap_or_else(|| aggregate_id.to_string()),
            customer_name: str_field("customerName"),
            priority: payload
                .get("priority")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default(),
            total_value: payload.get("totalAmount").and_then(Value::as_f64),
            total_items: payload.get("totalItems").and_then(Value::as_u64),
            warehouse: str_field("preferredWarehouse"),
            external_id: str_field("externalId"),
        }
    }
}

/// One entry in an order's phase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseHistoryEntry {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Full lifecycle state of one order.
///
/// Mutated only under the order's entry lock; queries hand out clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleState {
    pub aggregate_id: AggregateId,
    pub organization_id: OrganizationId,
    pub current_phase: Phase,
    pub phase_status: PhaseStatus,
    pub phase_data: PhaseData,
    pub start_time: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    pub actual_completion: Option<DateTime<Utc>>,
    pub blockers: Vec<String>,
    pub assigned_team: Vec<String>,
    pub priority: Priority,
    pub order_details: OrderDetails,
    pub phase_history: Vec<PhaseHistoryEntry>,
}

impl LifecycleState {
    /// Opens a lifecycle in the first phase from an ORDER_PLACED payload.
    pub fn open(
        aggregate_id: AggregateId,
        organization_id: OrganizationId,
        payload: &Value,
    ) -> Self {
        let now = Utc::now();
        let order_details = OrderDetails::from_payload(aggregate_id, payload);
        Self {
            aggregate_id,
            organization_id,
            current_phase: Phase::OrderCreation,
            phase_status: PhaseStatus::InProgress,
            phase_data: PhaseData::default(),
            start_time: now,
            estimated_completion: now + TRANSITIONS[0].duration(),
            actual_completion: None,
            blockers: Vec::new(),
            assigned_team: Phase::OrderCreation
                .teams()
                .iter()
                .map(|t| t.to_string())
                .collect(),
            priority: order_details.priority,
            order_details,
            phase_history: Vec::new(),
        }
    }
}

/// Aggregate lifecycle counts for one organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStats {
    pub total: u64,
    pub by_phase: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
    pub active_blockers: u64,
}

impl LifecycleStats {
    /// Folds one lifecycle into the counts.
    pub fn absorb(&mut self, state: &LifecycleState) {
        self.total += 1;
        *self
            .by_phase
            .entry(state.current_phase.as_str().to_string())
            .or_default() += 1;
        *self
            .by_status
            .entry(state.phase_status.as_str().to_string())
            .or_default() += 1;
        self.active_blockers += state.blockers.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_details_read_the_placement_payload() {
        let id = AggregateId::new();
        let details = OrderDetails::from_payload(
            id,
            &json!({
                "orderNumber": "ORD-1001",
                "customerName": "Acme Corp",
                "priority": "urgent",
                "totalAmount": 4999.5,
                "totalItems": 12,
                "preferredWarehouse": "WH-EAST",
                "externalId": "ext-77"
            }),
        );
        assert_eq!(details.order_number, "ORD-1001");
        assert_eq!(details.customer_name.as_deref(), Some("Acme Corp"));
        assert_eq!(details.priority, Priority::Urgent);
        assert_eq!(details.total_value, Some(4999.5));
        assert_eq!(details.total_items, Some(12));
        assert_eq!(details.warehouse.as_deref(), Some("WH-EAST"));
        assert_eq!(details.external_id.as_deref(), Some("ext-77"));
    }

    #[test]
    fn order_number_falls_back_to_the_aggregate_id() {
        let id = AggregateId::new();
        let details = OrderDetails::from_payload(id, &json!({}));
        assert_eq!(details.order_number, id.to_string());
        assert_eq!(details.priority, Priority::Medium);
        assert!(details.customer_name.is_none());
    }

    #[test]
    fn open_starts_the_first_phase_in_progress() {
        let id = AggregateId::new();
        let state = LifecycleState::open(
            id,
            OrganizationId::default(),
            &json!({"priority": "high"}),
        );
        assert_eq!(state.current_phase, Phase::OrderCreation);
        assert_eq!(state.phase_status, PhaseStatus::InProgress);
        assert_eq!(state.priority, Priority::High);
        assert_eq!(
            state.estimated_completion - state.start_time,
            TRANSITIONS[0].duration()
        );
        assert_eq!(state.assigned_team, vec!["sales_team", "customer_service"]);
        assert!(state.blockers.is_empty());
        assert!(state.phase_history.is_empty());
    }

    #[test]
    fn stats_fold_phases_statuses_and_blockers() {
        let mut a = LifecycleState::open(
            AggregateId::new(),
            OrganizationId::default(),
            &json!({}),
        );
        a.blockers.push("credit hold".to_string());
        let b = LifecycleState::open(
            AggregateId::new(),
            OrganizationId::default(),
            &json!({}),
        );

        let mut stats = LifecycleStats::default();
        stats.absorb(&a);
        stats.absorb(&b);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_phase.get("Order Creation"), Some(&2));
        assert_eq!(stats.by_status.get("in_progress"), Some(&2));
        assert_eq!(stats.active_blockers, 1);
    }

    #[test]
    fn lifecycle_state_serializes_camel_case() {
        let state = LifecycleState::open(
            AggregateId::new(),
            OrganizationId::default(),
            &json!({}),
        );
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("aggregateId").is_some());
        assert!(value.get("currentPhase").is_some());
        assert!(value.get("phaseStatus").is_some());
        assert!(value.get("estimatedCompletion").is_some());
        assert!(value.get("orderDetails").is_some());
        assert!(value.get("phaseHistory").is_some());
    }
}
