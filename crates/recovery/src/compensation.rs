//! Compensation workflows.
//!
//! A compensation template scripts the actions that undo a business operation
//! that already took effect, plus the rollback steps that restore the world
//! when the compensation itself fails partway. Step execution is delegated to
//! a [`StepRunner`] so the affected systems stay behind a seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use common::audit::{AuditCategory, AuditOutcome, AuditRecord, AuditSink, Severity};

use crate::error::{OperationError, RecoveryError, Result};
use crate::executor::severity_for;
use crate::result::{RecoveryAction, RecoveryResult};

/// Compensation workflows known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationKind {
    OrderCancellation,
    InventoryAdjustment,
    SupplierNotification,
}

impl CompensationKind {
    pub const ALL: [CompensationKind; 3] = [
        CompensationKind::OrderCancellation,
        CompensationKind::InventoryAdjustment,
        CompensationKind::SupplierNotification,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCancellation => "Order Cancellation",
            Self::InventoryAdjustment => "Inventory Adjustment",
            Self::SupplierNotification => "Supplier Notification",
        }
    }
}

impl std::fmt::Display for CompensationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a compensation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Scripted compensation workflow.
#[derive(Debug, Clone)]
pub struct CompensationTemplate {
    pub kind: CompensationKind,
    pub description: &'static str,
    /// Compensating actions, executed in order.
    pub actions: &'static [&'static str],
    /// Steps that restore the pre-compensation state, executed in order when
    /// an action fails.
    pub rollback_steps: &'static [&'static str],
    /// Systems the workflow touches.
    pub dependencies: &'static [&'static str],
    pub estimated_time: Duration,
    pub priority: ActionPriority,
}

impl CompensationTemplate {
    pub const fn order_cancellation() -> Self {
        Self {
            kind: CompensationKind::OrderCancellation,
            description: "Reverse all related transactions",
            actions: &[
                "Cancel purchase orders",
                "Release allocated inventory",
                "Reverse payment transactions",
                "Notify suppliers of cancellation",
                "Update order status to cancelled",
            ],
            rollback_steps: &[
                "Restore original order state",
                "Re-allocate inventory",
                "Re-process payments",
                "Re-notify suppliers",
            ],
            dependencies: &["inventory_system", "payment_system", "supplier_system"],
            estimated_time: Duration::from_secs(300),
            priority: ActionPriority::High,
        }
    }

    pub const fn inventory_adjustment() -> Self {
        Self {
            kind: CompensationKind::InventoryAdjustment,
            description: "Correct stock levels",
            actions: &[
                "Audit current inventory levels",
                "Identify discrepancies",
                "Adjust stock quantities",
                "Update inventory records",
                "Notify relevant teams",
            ],
            rollback_steps: &[
                "Restore original inventory levels",
                "Revert inventory records",
                "Notify teams of rollback",
            ],
            dependencies: &["inventory_system", "audit_system"],
            estimated_time: Duration::from_secs(180),
            priority: ActionPriority::Medium,
        }
    }

    pub const fn supplier_notification() -> Self {
        Self {
            kind: CompensationKind::SupplierNotification,
            description: "Cancel or modify PO",
            actions: &[
                "Identify affected purchase orders",
                "Calculate modification requirements",
                "Send cancellation/modification requests",
                "Update PO status",
                "Track supplier responses",
            ],
            rollback_steps: &[
                "Restore original PO state",
                "Send correction notifications",
                "Update PO records",
            ],
            dependencies: &["purchase_order_system", "supplier_system"],
            estimated_time: Duration::from_secs(240),
            priority: ActionPriority::High,
        }
    }
}

/// Registry mapping compensation kinds to their templates.
#[derive(Debug, Clone, Default)]
pub struct CompensationRegistry {
    templates: HashMap<CompensationKind, CompensationTemplate>,
}

impl CompensationRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the stock workflows.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(CompensationTemplate::order_cancellation());
        registry.register(CompensationTemplate::inventory_adjustment());
        registry.register(CompensationTemplate::supplier_notification());
        registry
    }

    pub fn register(&mut self, template: CompensationTemplate) {
        self.templates.insert(template.kind, template);
    }

    pub fn get(&self, kind: CompensationKind) -> Option<&CompensationTemplate> {
        self.templates.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Executes individual compensation and rollback steps against the affected
/// systems.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(
        &self,
        step: &str,
        context: &Value,
    ) -> std::result::Result<(), OperationError>;

    async fn run_rollback(
        &self,
        step: &str,
        context: &Value,
    ) -> std::result::Result<(), OperationError>;
}

/// Step runner that records invocations in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryStepRunner {
    steps: Mutex<Vec<String>>,
    rollbacks: Mutex<Vec<String>>,
    fail_on_step: Mutex<Option<String>>,
    fail_on_rollback: Mutex<Option<String>>,
}

impl InMemoryStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps that completed, in execution order.
    pub fn executed_steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    /// Rollback steps that completed, in execution order.
    pub fn executed_rollbacks(&self) -> Vec<String> {
        self.rollbacks.lock().unwrap().clone()
    }

    /// Makes the named step fail on every run.
    pub fn set_fail_on_step(&self, step: impl Into<String>) {
        *self.fail_on_step.lock().unwrap() = Some(step.into());
    }

    /// Makes the named rollback step fail on every run.
    pub fn set_fail_on_rollback(&self, step: impl Into<String>) {
        *self.fail_on_rollback.lock().unwrap() = Some(step.into());
    }
}

#[async_trait]
impl StepRunner for InMemoryStepRunner {
    async fn run_step(
        &self,
        step: &str,
        _context: &Value,
    ) -> std::result::Result<(), OperationError> {
        if self.fail_on_step.lock().unwrap().as_deref() == Some(step) {
            return Err(OperationError::new(format!("step '{step}' failed")));
        }
        self.steps.lock().unwrap().push(step.to_string());
        Ok(())
    }

    async fn run_rollback(
        &self,
        step: &str,
        _context: &Value,
    ) -> std::result::Result<(), OperationError> {
        if self.fail_on_rollback.lock().unwrap().as_deref() == Some(step) {
            return Err(OperationError::new(format!("rollback '{step}' failed")));
        }
        self.rollbacks.lock().unwrap().push(step.to_string());
        Ok(())
    }
}

/// Walks compensation templates action by action and rolls back on failure.
///
/// Every call, including one naming an unregistered template, produces exactly
/// one audit record.
pub struct CompensationCoordinator {
    registry: CompensationRegistry,
    runner: Arc<dyn StepRunner>,
    audit: Arc<dyn AuditSink>,
}

impl CompensationCoordinator {
    pub fn new(
        registry: CompensationRegistry,
        runner: Arc<dyn StepRunner>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            runner,
            audit,
        }
    }

    /// Coordinator with the stock templates.
    pub fn with_defaults(runner: Arc<dyn StepRunner>, audit: Arc<dyn AuditSink>) -> Self {
        Self::new(CompensationRegistry::with_defaults(), runner, audit)
    }

    /// Runs the named workflow against `context`.
    ///
    /// Actions execute in template order. The first failure stops the walk
    /// and triggers every rollback step; rollback failures are logged and do
    /// not stop the remaining rollbacks. Partial failure is reported as a
    /// `compensation_failed` result, not an error.
    #[tracing::instrument(skip(self, context), fields(template = %kind))]
    pub async fn compensate(&self, kind: CompensationKind, context: Value) -> Result<RecoveryResult> {
        let started = tokio::time::Instant::now();

        let Some(template) = self.registry.get(kind) else {
            tracing::error!("compensation template not registered");
            self.audit.record(AuditRecord::now(
                "compensation_event",
                AuditCategory::System,
                Severity::Error,
                kind.as_str(),
                RecoveryAction::CompensationFailed.as_str(),
                AuditOutcome::Failure,
                json!({
                    "context": context,
                    "error": format!("compensation template '{kind}' is not registered"),
                }),
            ));
            return Err(RecoveryError::UnknownTemplate(kind));
        };

        for &step in template.actions {
            if let Err(error) = self.runner.run_step(step, &context).await {
                tracing::error!(step, %error, "compensation step failed, rolling back");
                metrics::counter!("compensation_rollbacks_total", "template" => kind.as_str())
                    .increment(1);
                self.roll_back(template, &context).await;
                let result = RecoveryResult::resolved(
                    RecoveryAction::CompensationFailed,
                    json!({"error": error.to_string()}),
                    0,
                    started.elapsed(),
                );
                return Ok(self.finish(kind, &context, result));
            }
            tracing::debug!(step, "compensation step completed");
        }

        let result = RecoveryResult::resolved(
            RecoveryAction::CompensationCompleted,
            json!({"message": "Compensation completed successfully"}),
            0,
            started.elapsed(),
        );
        Ok(self.finish(kind, &context, result))
    }

    /// Runs every rollback step, continuing past individual failures.
    async fn roll_back(&self, template: &CompensationTemplate, context: &Value) {
        for &step in template.rollback_steps {
            if let Err(error) = self.runner.run_rollback(step, context).await {
                tracing::error!(step, %error, "rollback step failed");
                metrics::counter!(
                    "compensation_rollback_failures_total",
                    "template" => template.kind.as_str(),
                )
                .increment(1);
            }
        }
    }

    fn finish(
        &self,
        kind: CompensationKind,
        context: &Value,
        result: RecoveryResult,
    ) -> RecoveryResult {
        metrics::counter!(
            "compensation_results_total",
            "template" => kind.as_str(),
            "action" => result.action.as_str(),
        )
        .increment(1);
        let outcome = if result.success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit.record(AuditRecord::now(
            "compensation_event",
            AuditCategory::System,
            severity_for(result.action),
            kind.as_str(),
            result.action.as_str(),
            outcome,
            json!({"context": context, "result": result.result}),
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::audit::InMemoryAuditSink;

    struct Harness {
        coordinator: CompensationCoordinator,
        runner: Arc<InMemoryStepRunner>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn harness() -> Harness {
        let runner = Arc::new(InMemoryStepRunner::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let coordinator = CompensationCoordinator::with_defaults(runner.clone(), audit.clone());
        Harness {
            coordinator,
            runner,
            audit,
        }
    }

    #[tokio::test]
    async fn order_cancellation_runs_every_action_in_order() {
        let harness = harness();

        let result = harness
            .coordinator
            .compensate(CompensationKind::OrderCancellation, json!({"orderId": "o1"}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.action, RecoveryAction::CompensationCompleted);
        assert_eq!(result.result["message"], "Compensation completed successfully");
        assert_eq!(result.retry_count, 0);
        assert_eq!(
            harness.runner.executed_steps(),
            vec![
                "Cancel purchase orders",
                "Release allocated inventory",
                "Reverse payment transactions",
                "Notify suppliers of cancellation",
                "Update order status to cancelled",
            ]
        );
        assert!(harness.runner.executed_rollbacks().is_empty());
    }

    #[tokio::test]
    async fn step_failure_stops_the_walk_and_rolls_back_fully() {
        let harness = harness();
        harness.runner.set_fail_on_step("Adjust stock quantities");

        let result = harness
            .coordinator
            .compensate(CompensationKind::InventoryAdjustment, json!({}))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.action, RecoveryAction::CompensationFailed);
        assert_eq!(result.result["error"], "step 'Adjust stock quantities' failed");
        assert_eq!(
            harness.runner.executed_steps(),
            vec!["Audit current inventory levels", "Identify discrepancies"]
        );
        assert_eq!(
            harness.runner.executed_rollbacks(),
            vec![
                "Restore original inventory levels",
                "Revert inventory records",
                "Notify teams of rollback",
            ]
        );
    }

    #[tokio::test]
    async fn rollback_failure_does_not_stop_remaining_rollbacks() {
        let harness = harness();
        harness.runner.set_fail_on_step("Adjust stock quantities");
        harness
            .runner
            .set_fail_on_rollback("Restore original inventory levels");

        let result = harness
            .coordinator
            .compensate(CompensationKind::InventoryAdjustment, json!({}))
            .await
            .unwrap();

        assert_eq!(result.action, RecoveryAction::CompensationFailed);
        assert_eq!(
            harness.runner.executed_rollbacks(),
            vec!["Revert inventory records", "Notify teams of rollback"]
        );
    }

    #[tokio::test]
    async fn every_call_is_audited_exactly_once() {
        let harness = harness();

        harness
            .coordinator
            .compensate(CompensationKind::SupplierNotification, json!({}))
            .await
            .unwrap();
        harness.runner.set_fail_on_step("Update PO status");
        harness
            .coordinator
            .compensate(CompensationKind::SupplierNotification, json!({}))
            .await
            .unwrap();

        let records = harness.audit.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "compensation_completed");
        assert_eq!(records[0].severity, Severity::Info);
        assert_eq!(records[1].action, "compensation_failed");
        assert_eq!(records[1].severity, Severity::Error);
        assert_eq!(records[1].resource_id, "Supplier Notification");
    }

    #[tokio::test]
    async fn unknown_template_is_an_error_and_still_audited() {
        let runner = Arc::new(InMemoryStepRunner::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let coordinator = CompensationCoordinator::new(
            CompensationRegistry::empty(),
            runner.clone(),
            audit.clone(),
        );

        let error = coordinator
            .compensate(CompensationKind::OrderCancellation, json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            RecoveryError::UnknownTemplate(CompensationKind::OrderCancellation)
        ));
        assert_eq!(audit.len(), 1);
        assert!(runner.executed_steps().is_empty());
    }

    #[test]
    fn stock_registry_carries_the_three_workflows() {
        let registry = CompensationRegistry::with_defaults();
        assert_eq!(registry.len(), 3);

        let template = registry.get(CompensationKind::OrderCancellation).unwrap();
        assert_eq!(template.description, "Reverse all related transactions");
        assert_eq!(template.actions.len(), 5);
        assert_eq!(template.rollback_steps.len(), 4);
        assert_eq!(template.priority, ActionPriority::High);
        assert_eq!(template.estimated_time, Duration::from_secs(300));
        assert_eq!(
            template.dependencies,
            &["inventory_system", "payment_system", "supplier_system"]
        );
    }
}
