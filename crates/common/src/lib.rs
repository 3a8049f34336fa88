//! Shared identifier types, priorities, and the audit boundary used by every
//! crate in the orchestration engine.

pub mod audit;
pub mod types;

pub use audit::{
    AuditCategory, AuditOutcome, AuditRecord, AuditSink, InMemoryAuditSink, Severity,
    TracingAuditSink,
};
pub use types::{AggregateId, CorrelationId, OrganizationId, Priority};
