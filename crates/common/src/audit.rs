//! Audit collaborator boundary.
//!
//! Recovery results and lifecycle phase-history entries are forwarded to an
//! external audit/compliance system. Only the record shape and the sink trait
//! are defined here; transports live outside the engine.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    Data,
    Security,
    Admin,
    System,
}

/// Audit record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Partial,
}

/// Structured record forwarded to the audit collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub event_type: String,
    pub category: AuditCategory,
    pub severity: Severity,
    pub resource_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds a record stamped with the current time.
    pub fn now(
        event_type: impl Into<String>,
        category: AuditCategory,
        severity: Severity,
        resource_id: impl Into<String>,
        action: impl Into<String>,
        outcome: AuditOutcome,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            category,
            severity,
            resource_id: resource_id.into(),
            action: action.into(),
            outcome,
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for audit records.
///
/// Recording is fire-and-forget: a sink must never fail the caller. Slow or
/// remote transports belong behind a queueing implementation.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Audit sink that retains records in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record seen so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records seen so far.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Audit sink that emits records as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            event_type = %record.event_type,
            category = ?record.category,
            severity = ?record.severity,
            resource_id = %record.resource_id,
            action = %record.action,
            outcome = ?record.outcome,
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_retains_records() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditRecord::now(
            "recovery_result",
            AuditCategory::System,
            Severity::Info,
            "order-1",
            "retry",
            AuditOutcome::Success,
            serde_json::json!({"retryCount": 0}),
        ));

        assert_eq!(sink.len(), 1);
        let records = sink.records();
        assert_eq!(records[0].action, "retry");
        assert_eq!(records[0].outcome, AuditOutcome::Success);
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = AuditRecord::now(
            "phase_history",
            AuditCategory::System,
            Severity::Warning,
            "order-2",
            "phase_blocked",
            AuditOutcome::Partial,
            serde_json::Value::Null,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["eventType"], "phase_history");
        assert_eq!(json["resourceId"], "order-2");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["outcome"], "partial");
    }
}
