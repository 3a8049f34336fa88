//! Typed payloads for the event vocabulary.
//!
//! The log itself never interprets payloads; these structs are the shared
//! vocabulary used by the stream processor, the lifecycle machine, and the
//! API layer. Wire keys are camelCase. Domain payload fields are optional
//! with defaults so partially-filled facts from upstream systems still
//! deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::Priority;

use crate::event::EventType;

/// Payload of `ORDER_PLACED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderPlacedData {
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    pub priority: Option<Priority>,
    pub total_amount: Option<f64>,
    pub total_items: Option<u32>,
    pub preferred_warehouse: Option<String>,
    pub external_id: Option<String>,
    /// Whether customer requirements were fully captured at placement.
    pub requirements_complete: Option<bool>,
    pub credit_check_passed: Option<bool>,
}

/// Payload of `INVENTORY_CHECKED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryCheckedData {
    pub has_sufficient_stock: bool,
    pub required_materials: Vec<String>,
    pub warehouse: Option<String>,
}

/// Payload of `PO_GENERATED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoGeneratedData {
    pub po_number: Option<String>,
    pub required_materials: Vec<String>,
    pub supplier: Option<String>,
}

/// Payload of `MATERIAL_RECEIVED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialReceivedData {
    pub po_number: Option<String>,
    pub materials: Vec<String>,
}

/// Payload of `PRODUCTION_STARTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductionStartedData {
    pub production_line: Option<String>,
    pub scheduled_completion: Option<DateTime<Utc>>,
}

/// Payload of `QUALITY_PASSED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityPassedData {
    pub inspector: Option<String>,
    pub notes: Option<String>,
}

/// Payload of `ORDER_SHIPPED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderShippedData {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Payload of `ORDER_DELIVERED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderDeliveredData {
    pub received_by: Option<String>,
}

/// Payload of `ORDER_CANCELLED` and `ORDER_RETURNED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderClosedData {
    pub reason: Option<String>,
}

/// Payload of the synthesized `STATE_CHANGED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedData {
    pub previous_state: String,
    pub new_state: String,
    pub trigger: EventType,
}

/// Payload of the synthesized `EXCEPTION_RAISED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRaisedData {
    pub original_event_type: EventType,
    pub error: String,
}
