//! Retry executor.
//!
//! Runs an operation under a named [`RetryPolicy`]: bounded attempts with
//! backoff between them, an optional circuit breaker in front, and the
//! policy's fallback once attempts are spent. The outcome is always a
//! [`RecoveryResult`]; operation failures never escape as errors.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};

use common::audit::{AuditCategory, AuditOutcome, AuditRecord, AuditSink, Severity};

use crate::breaker::{BreakerStatus, CircuitBreakers, CircuitState};
use crate::error::OperationError;
use crate::fallback::{BuiltinFallbacks, FallbackHandler};
use crate::policy::{PolicyName, PolicyRegistry, RetryPolicy};
use crate::result::{RecoveryAction, RecoveryResult};

/// Executes operations under retry policies and reports every outcome to the
/// audit sink exactly once.
pub struct RetryExecutor {
    policies: PolicyRegistry,
    breakers: CircuitBreakers,
    fallbacks: Arc<dyn FallbackHandler>,
    audit: Arc<dyn AuditSink>,
}

impl RetryExecutor {
    pub fn new(
        policies: PolicyRegistry,
        fallbacks: Arc<dyn FallbackHandler>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            policies,
            breakers: CircuitBreakers::new(),
            fallbacks,
            audit,
        }
    }

    /// Executor with the stock policies and in-process fallbacks.
    pub fn with_defaults(audit: Arc<dyn AuditSink>) -> Self {
        Self::new(
            PolicyRegistry::with_defaults(),
            Arc::new(BuiltinFallbacks::new()),
            audit,
        )
    }

    /// Runs `operation` under the named policy.
    ///
    /// The operation receives the 0-based attempt index and may be invoked up
    /// to `max_retries + 1` times. An open breaker routes straight to the
    /// fallback without invoking the operation; a breaker that trips mid-run
    /// abandons the remaining retry budget the same way.
    #[tracing::instrument(skip(self, context, operation), fields(policy = %policy_name))]
    pub async fn execute<F, Fut>(
        &self,
        policy_name: PolicyName,
        context: Value,
        mut operation: F,
    ) -> RecoveryResult
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Value, OperationError>> + Send,
    {
        let started = tokio::time::Instant::now();

        let Some(policy) = self.policies.get(policy_name) else {
            tracing::warn!("no retry policy registered");
            let result = RecoveryResult::resolved(
                RecoveryAction::NoPolicy,
                json!({"error": "No retry policy found for this error"}),
                0,
                started.elapsed(),
            );
            return self.finish(policy_name, &context, result);
        };

        if let Some(breaker) = &policy.breaker
            && self.breakers.check(policy_name, breaker) == CircuitState::Open
        {
            tracing::warn!("circuit open, routing to fallback");
            let result = self.run_fallback(policy, &context, 0, started).await;
            return self.finish(policy_name, &context, result);
        }

        let mut last_attempt = 0;
        for attempt in 0..=policy.max_retries {
            last_attempt = attempt;
            match operation(attempt).await {
                Ok(value) => {
                    if policy.breaker.is_some() {
                        self.breakers.record_success(policy_name);
                    }
                    tracing::debug!(attempt, "operation recovered");
                    let result = RecoveryResult::resolved(
                        RecoveryAction::RetrySuccess,
                        value,
                        attempt,
                        started.elapsed(),
                    );
                    return self.finish(policy_name, &context, result);
                }
                Err(error) => {
                    tracing::debug!(attempt, %error, "attempt failed");
                    let delay = policy.backoff_delay(attempt);
                    if let Some(breaker) = &policy.breaker
                        && self.breakers.record_failure(policy_name, breaker)
                    {
                        let result = self.run_fallback(policy, &context, attempt, started).await;
                        return self.finish(policy_name, &context, result);
                    }
                    if attempt < policy.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::debug!("retry budget exhausted");
        let result = self
            .run_fallback(policy, &context, last_attempt, started)
            .await;
        self.finish(policy_name, &context, result)
    }

    /// Breaker position and failure count per policy, for statistics.
    pub fn circuit_status(&self) -> Vec<(PolicyName, BreakerStatus)> {
        self.breakers.statuses()
    }

    async fn run_fallback(
        &self,
        policy: &RetryPolicy,
        context: &Value,
        retry_count: u32,
        started: tokio::time::Instant,
    ) -> RecoveryResult {
        match self.fallbacks.run(policy.fallback, context).await {
            Ok(value) => RecoveryResult::resolved(
                RecoveryAction::FallbackSuccess,
                value,
                retry_count,
                started.elapsed(),
            ),
            Err(error) => {
                tracing::error!(%error, "fallback failed");
                RecoveryResult::resolved(
                    RecoveryAction::FallbackFailed,
                    json!({"error": error.to_string()}),
                    retry_count,
                    started.elapsed(),
                )
            }
        }
    }

    /// Records metrics and the audit trail for a terminal result.
    fn finish(&self, policy: PolicyName, context: &Value, result: RecoveryResult) -> RecoveryResult {
        metrics::counter!(
            "recovery_results_total",
            "policy" => policy.as_str(),
            "action" => result.action.as_str(),
        )
        .increment(1);
        metrics::histogram!("recovery_duration_seconds", "policy" => policy.as_str())
            .record(result.duration_ms as f64 / 1_000.0);

        let severity = severity_for(result.action);
        let outcome = if result.success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit.record(AuditRecord::now(
            "recovery_result",
            AuditCategory::System,
            severity,
            policy.as_str(),
            result.action.as_str(),
            outcome,
            json!({
                "context": context,
                "result": result.result,
                "retryCount": result.retry_count,
                "durationMs": result.duration_ms,
            }),
        ));
        result
    }
}

/// Audit severity for a terminal action: degraded answers are warnings, dead
/// ends are errors.
pub(crate) fn severity_for(action: RecoveryAction) -> Severity {
    match action {
        RecoveryAction::RetrySuccess | RecoveryAction::CompensationCompleted => Severity::Info,
        RecoveryAction::FallbackSuccess => Severity::Warning,
        RecoveryAction::FallbackFailed
        | RecoveryAction::NoPolicy
        | RecoveryAction::CompensationFailed => Severity::Error,
    }
}
