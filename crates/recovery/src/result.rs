//! Tagged recovery outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a recovery attempt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// An attempt within the retry budget succeeded.
    RetrySuccess,
    /// Retries were exhausted or the breaker was open; the fallback answered.
    FallbackSuccess,
    /// The fallback itself failed.
    FallbackFailed,
    /// No retry policy is registered under the requested name.
    NoPolicy,
    /// Every compensating action completed.
    CompensationCompleted,
    /// A compensating action failed; rollback was attempted.
    CompensationFailed,
}

impl RecoveryAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetrySuccess => "retry_success",
            Self::FallbackSuccess => "fallback_success",
            Self::FallbackFailed => "fallback_failed",
            Self::NoPolicy => "no_policy",
            Self::CompensationCompleted => "compensation_completed",
            Self::CompensationFailed => "compensation_failed",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a recovery flow.
///
/// Returned for every executor and compensation call, success or not, so the
/// caller can branch on [`RecoveryAction`] instead of catching errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub success: bool,
    pub action: RecoveryAction,
    /// Payload produced by the winning attempt, the fallback, or an
    /// `{"error": ...}` object on failure.
    pub result: Value,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Index of the last attempt made before this outcome (0 when the
    /// operation never ran).
    pub retry_count: u32,
}

impl RecoveryResult {
    pub(crate) fn resolved(
        action: RecoveryAction,
        result: Value,
        retry_count: u32,
        elapsed: std::time::Duration,
    ) -> Self {
        let success = matches!(
            action,
            RecoveryAction::RetrySuccess
                | RecoveryAction::FallbackSuccess
                | RecoveryAction::CompensationCompleted
        );
        Self {
            success,
            action,
            result,
            timestamp: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
            retry_count,
        }
    }
}
