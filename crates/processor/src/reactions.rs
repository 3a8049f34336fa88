//! Orchestration decision table: which follow-on event a domain event triggers.

use event_log::{Event, EventType, InventoryCheckedData};
use serde_json::{Value, json};

/// A follow-on event seeded by the decision table.
///
/// The processor turns this into a full event with causation metadata
/// inherited from the trigger.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub event_type: EventType,
    pub payload: Value,
}

/// Returns the follow-on event for `event`, if the rules call for one.
///
/// The table is deliberately small:
/// - ORDER_PLACED triggers an inventory check, enriched with a stubbed
///   deterministic stock answer
/// - INVENTORY_CHECKED triggers PO generation only when the payload
///   reports sufficient stock
/// - MATERIAL_RECEIVED triggers production start
/// - QUALITY_PASSED triggers shipping
///
/// Everything else, including the synthetic types, triggers nothing. After
/// PO_GENERATED, PRODUCTION_STARTED, and ORDER_SHIPPED the next step arrives
/// from an outside system, so the chain pauses there.
pub fn reaction_for(event: &Event) -> Option<Reaction> {
    match event.event_type {
        EventType::OrderPlaced => Some(Reaction {
            event_type: EventType::InventoryChecked,
            payload: json!({
                "trigger": EventType::OrderPlaced,
                "orderData": event.payload.clone(),
                "hasSufficientStock": true,
                "requiredMaterials": ["steel_sheet", "fasteners", "packaging"],
                "warehouse": "primary",
            }),
        }),
        EventType::InventoryChecked => {
            let data: InventoryCheckedData =
                serde_json::from_value(event.payload.clone()).unwrap_or_default();
            if !data.has_sufficient_stock {
                return None;
            }
            Some(Reaction {
                event_type: EventType::PoGenerated,
                payload: json!({
                    "trigger": EventType::InventoryChecked,
                    "requiredMaterials": data.required_materials,
                }),
            })
        }
        EventType::MaterialReceived => Some(Reaction {
            event_type: EventType::ProductionStarted,
            payload: json!({
                "trigger": EventType::MaterialReceived,
                "materialsReceived": event
                    .payload
                    .get("materials")
                    .cloned()
                    .unwrap_or_else(|| json!([])),
            }),
        }),
        EventType::QualityPassed => Some(Reaction {
            event_type: EventType::OrderShipped,
            payload: json!({
                "trigger": EventType::QualityPassed,
                "qualityResults": event.payload.clone(),
            }),
        }),
        _ => None,
    }
}
