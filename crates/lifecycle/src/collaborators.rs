//! Collaborator seams: business rules, MRP planning, and notifications.
//!
//! Real deployments put the rule service, the MRP/ERP bridge, and the
//! websocket fan-out behind these traits. The in-memory implementations serve
//! tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::AggregateId;
use recovery::OperationError;

/// Verdict from the business-rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// Validates business data of a named type.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn validate(
        &self,
        data_type: &str,
        payload: &Value,
    ) -> Result<ValidationResult, OperationError>;
}

/// Material plan produced by the MRP engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialPlan {
    pub materials: Vec<String>,
    pub supplier: String,
    pub estimated_cost: f64,
    pub lead_time_days: u32,
}

/// Plans material requirements for an order.
#[async_trait]
pub trait MrpEngine: Send + Sync {
    async fn plan(
        &self,
        aggregate_id: AggregateId,
        requirements: &Value,
    ) -> Result<MaterialPlan, OperationError>;
}

/// Message published to one notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub channel: String,
    pub event_name: String,
    pub payload: Value,
}

/// Notification transport.
///
/// Publishing is fire-and-forget: the transport must never fail the caller.
pub trait Notifier: Send + Sync {
    fn publish(&self, message: ChannelMessage);
}

/// Rule engine that approves everything unless told otherwise.
#[derive(Debug, Default)]
pub struct InMemoryRuleEngine {
    rejections: Mutex<HashMap<String, Vec<String>>>,
    fail_on_validate: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes validations of `data_type` come back invalid with `errors`.
    pub fn set_reject(&self, data_type: impl Into<String>, errors: Vec<String>) {
        self.rejections.lock().unwrap().insert(data_type.into(), errors);
    }

    /// Makes every validation fail at the transport level.
    pub fn set_fail_on_validate(&self, fail: bool) {
        *self.fail_on_validate.lock().unwrap() = fail;
    }

    /// Data types validated so far, in call order.
    pub fn validated_types(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuleEngine for InMemoryRuleEngine {
    async fn validate(
        &self,
        data_type: &str,
        _payload: &Value,
    ) -> Result<ValidationResult, OperationError> {
        if *self.fail_on_validate.lock().unwrap() {
            return Err(OperationError::new("rule engine unavailable"));
        }
        self.calls.lock().unwrap().push(data_type.to_string());
        match self.rejections.lock().unwrap().get(data_type) {
            Some(errors) => Ok(ValidationResult::invalid(errors.clone())),
            None => Ok(ValidationResult::valid()),
        }
    }
}

/// MRP engine that returns a canned plan.
#[derive(Debug)]
pub struct InMemoryMrpEngine {
    plan: Mutex<MaterialPlan>,
    fail_on_plan: Mutex<bool>,
    calls: Mutex<Vec<AggregateId>>,
}

impl Default for InMemoryMrpEngine {
    fn default() -> Self {
        Self {
            plan: Mutex::new(MaterialPlan {
                materials: vec![
                    "steel_sheet".to_string(),
                    "fasteners".to_string(),
                    "packaging".to_string(),
                ],
                supplier: "primary-supplier".to_string(),
                estimated_cost: 1250.0,
                lead_time_days: 5,
            }),
            fail_on_plan: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryMrpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the canned plan.
    pub fn set_plan(&self, plan: MaterialPlan) {
        *self.plan.lock().unwrap() = plan;
    }

    /// Makes every planning call fail.
    pub fn set_fail_on_plan(&self, fail: bool) {
        *self.fail_on_plan.lock().unwrap() = fail;
    }

    /// Orders planned so far, in call order.
    pub fn planned_orders(&self) -> Vec<AggregateId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MrpEngine for InMemoryMrpEngine {
    async fn plan(
        &self,
        aggregate_id: AggregateId,
        _requirements: &Value,
    ) -> Result<MaterialPlan, OperationError> {
        if *self.fail_on_plan.lock().unwrap() {
            return Err(OperationError::new("ERP connection refused"));
        }
        self.calls.lock().unwrap().push(aggregate_id);
        Ok(self.plan.lock().unwrap().clone())
    }
}

/// Notifier that retains published messages in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    messages: Mutex<Vec<ChannelMessage>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in order.
    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Messages published to one channel, in order.
    pub fn for_channel(&self, channel: &str) -> Vec<ChannelMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect()
    }
}

impl Notifier for InMemoryNotifier {
    fn publish(&self, message: ChannelMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Notifier that emits messages as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, message: ChannelMessage) {
        tracing::info!(
            channel = %message.channel,
            event_name = %message.event_name,
            "notification"
        );
    }
}
