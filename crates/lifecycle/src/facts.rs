//! Accumulated phase facts.
//!
//! Every observed event merges its facts here; exit-edge preconditions read
//! them. Five facts default to true because the corresponding checks happen
//! outside this system and only report in when they fail: a payload carrying
//! the flag can clear or set them at any time.

use event_log::{Event, EventType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collaborators::MaterialPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseData {
    pub requirements_complete: bool,
    pub credit_check_passed: bool,
    pub validation_complete: bool,
    /// Set when an inventory check reports insufficient stock.
    pub approval_required: bool,
    pub approval_complete: bool,
    pub procurement_initiated: bool,
    pub mrp_calculation_complete: bool,
    pub materials_available: bool,
    pub production_scheduled: bool,
    pub initial_inspection_done: bool,
    pub quality_passed: bool,
    pub documentation_complete: bool,
    pub order_shipped: bool,
    pub shipping_confirmed: bool,
    pub delivery_confirmed: bool,
    /// Material plan stored by the MRP entry action.
    pub purchase_order: Option<MaterialPlan>,
    /// Raw payload snapshots keyed by source, kept for operators.
    pub records: Map<String, Value>,
}

impl Default for PhaseData {
    fn default() -> Self {
        Self {
            requirements_complete: false,
            credit_check_passed: true,
            validation_complete: false,
            approval_required: false,
            approval_complete: true,
            procurement_initiated: false,
            mrp_calculation_complete: false,
            materials_available: false,
            production_scheduled: false,
            initial_inspection_done: true,
            quality_passed: false,
            documentation_complete: true,
            order_shipped: false,
            shipping_confirmed: true,
            delivery_confirmed: false,
            purchase_order: None,
            records: Map::new(),
        }
    }
}

impl PhaseData {
    /// Merges the facts carried by one event.
    pub fn merge_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::OrderPlaced => {
                self.requirements_complete = true;
                self.record("customerRequirements", event);
            }
            EventType::InventoryChecked => {
                self.validation_complete = true;
                self.approval_required =
                    event.payload.get("hasSufficientStock").and_then(Value::as_bool)
                        == Some(false);
                self.record("inventoryCheck", event);
            }
            EventType::PoGenerated => {
                self.procurement_initiated = true;
                self.record("procurement", event);
            }
            EventType::MaterialReceived => {
                self.materials_available = true;
                self.record("materialReceipt", event);
            }
            EventType::ProductionStarted => {
                self.production_scheduled = true;
                self.record("productionRun", event);
            }
            EventType::QualityPassed => {
                self.quality_passed = true;
                self.record("qualityResults", event);
            }
            EventType::OrderShipped => {
                self.order_shipped = true;
                self.record("shippingInfo", event);
            }
            EventType::OrderDelivered => {
                self.delivery_confirmed = true;
                self.record("deliveryConfirmation", event);
            }
            EventType::OrderCancelled => {
                self.record("cancellation", event);
            }
            EventType::OrderReturned => {
                self.record("returnRequest", event);
            }
            // Synthetic events carry no phase facts.
            EventType::StateChanged | EventType::ExceptionRaised => {}
        }
        self.apply_overrides(&event.payload);
    }

    fn record(&mut self, key: &str, event: &Event) {
        self.records.insert(key.to_string(), event.payload.clone());
    }

    /// Payload flags may set or clear the externally-owned facts.
    fn apply_overrides(&mut self, payload: &Value) {
        let flags: [(&str, &mut bool); 5] = [
            ("creditCheckPassed", &mut self.credit_check_passed),
            ("approvalComplete", &mut self.approval_complete),
            ("initialInspectionDone", &mut self.initial_inspection_done),
            ("documentationComplete", &mut self.documentation_complete),
            ("shippingConfirmed", &mut self.shipping_confirmed),
        ];
        for (key, fact) in flags {
            if let Some(value) = payload.get(key).and_then(Value::as_bool) {
                *fact = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, OrganizationId};
    use serde_json::json;

    fn event(event_type: EventType, payload: Value) -> Event {
        Event::builder()
            .aggregate_id(AggregateId::new())
            .organization_id(OrganizationId::new("org-1"))
            .event_type(event_type)
            .payload_raw(payload)
            .build()
    }

    #[test]
    fn order_placed_sets_requirements_and_keeps_the_payload() {
        let mut data = PhaseData::default();
        data.merge_event(&event(
            EventType::OrderPlaced,
            json!({"orderId": "o1", "totalAmount": 99.5}),
        ));

        assert!(data.requirements_complete);
        assert_eq!(data.records["customerRequirements"]["totalAmount"], 99.5);
    }

    #[test]
    fn insufficient_stock_marks_approval_required() {
        let mut data = PhaseData::default();
        data.merge_event(&event(
            EventType::InventoryChecked,
            json!({"hasSufficientStock": false}),
        ));
        assert!(data.validation_complete);
        assert!(data.approval_required);

        data.merge_event(&event(
            EventType::InventoryChecked,
            json!({"hasSufficientStock": true}),
        ));
        assert!(!data.approval_required);
    }

    #[test]
    fn payload_flags_override_default_true_facts() {
        let mut data = PhaseData::default();
        assert!(data.credit_check_passed);

        data.merge_event(&event(
            EventType::OrderPlaced,
            json!({"creditCheckPassed": false, "documentationComplete": false}),
        ));
        assert!(!data.credit_check_passed);
        assert!(!data.documentation_complete);

        data.merge_event(&event(
            EventType::QualityPassed,
            json!({"documentationComplete": true}),
        ));
        assert!(data.documentation_complete);
        assert!(!data.credit_check_passed);
    }

    #[test]
    fn synthetic_events_merge_nothing() {
        let mut data = PhaseData::default();
        let before = data.clone();
        data.merge_event(&event(
            EventType::StateChanged,
            json!({"newState": "PLANNED"}),
        ));
        assert_eq!(data, before);
    }

    #[test]
    fn full_walk_accumulates_every_fact() {
        let mut data = PhaseData::default();
        for (event_type, payload) in [
            (EventType::OrderPlaced, json!({"orderId": "o1"})),
            (EventType::InventoryChecked, json!({"hasSufficientStock": true})),
            (EventType::PoGenerated, json!({})),
            (EventType::MaterialReceived, json!({})),
            (EventType::ProductionStarted, json!({})),
            (EventType::QualityPassed, json!({})),
            (EventType::OrderShipped, json!({})),
            (EventType::OrderDelivered, json!({})),
        ] {
            data.merge_event(&event(event_type, payload));
        }

        assert!(data.requirements_complete);
        assert!(data.validation_complete);
        assert!(data.procurement_initiated);
        assert!(data.materials_available);
        assert!(data.production_scheduled);
        assert!(data.quality_passed);
        assert!(data.order_shipped);
        assert!(data.delivery_confirmed);
        assert_eq!(data.records.len(), 8);
    }
}
