//! Named retry policies and backoff math.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fallback::FallbackStrategy;

/// Delay the backoff curves grow from.
const BASE_DELAY_MS: u64 = 1_000;

/// Failure domains with a registered retry policy.
///
/// Policies are keyed by the integration that failed, not by error class: an
/// ERP timeout and an ERP connection refusal retry the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    ErpConnection,
    AiService,
    PaymentProcessing,
}

impl PolicyName {
    pub const ALL: [PolicyName; 3] = [
        PolicyName::ErpConnection,
        PolicyName::AiService,
        PolicyName::PaymentProcessing,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ErpConnection => "ERP Connection",
            Self::AiService => "AI Service",
            Self::PaymentProcessing => "Payment Processing",
        }
    }
}

impl std::fmt::Display for PolicyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Constant,
}

/// Circuit breaker tuning for a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Cumulative failures that trip the breaker open.
    pub threshold: u32,
    /// How long the breaker stays open before a half-open probe is allowed.
    pub timeout: Duration,
}

/// Retry behavior for one failure domain.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub name: PolicyName,
    /// Retries after the first attempt, so `max_retries + 1` invocations total.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub multiplier: u32,
    /// Ceiling for any single delay. For `Constant` this is the whole delay.
    pub max_backoff: Duration,
    pub breaker: Option<CircuitBreakerConfig>,
    pub fallback: FallbackStrategy,
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// Linear backoff yields a zero delay after attempt 0 and constant backoff
    /// always waits the full `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped = |ms: u64| Duration::from_millis(ms).min(self.max_backoff);
        match self.backoff {
            BackoffStrategy::Exponential => capped(
                BASE_DELAY_MS.saturating_mul((self.multiplier as u64).saturating_pow(attempt)),
            ),
            BackoffStrategy::Linear => capped(
                BASE_DELAY_MS
                    .saturating_mul(self.multiplier as u64)
                    .saturating_mul(attempt as u64),
            ),
            BackoffStrategy::Constant => self.max_backoff,
        }
    }

    /// Policy for ERP integrations: patient retries, breaker against a dead
    /// connection, cached data while the ERP is away.
    pub fn erp_connection() -> Self {
        Self {
            name: PolicyName::ErpConnection,
            max_retries: 5,
            backoff: BackoffStrategy::Exponential,
            multiplier: 2,
            max_backoff: Duration::from_secs(300),
            breaker: Some(CircuitBreakerConfig {
                threshold: 3,
                timeout: Duration::from_secs(60),
            }),
            fallback: FallbackStrategy::CachedDataWithQueueSync,
        }
    }

    /// Policy for AI-backed services: a few quick retries, then rule-based
    /// processing takes over.
    pub fn ai_service() -> Self {
        Self {
            name: PolicyName::AiService,
            max_retries: 3,
            backoff: BackoffStrategy::Linear,
            multiplier: 1,
            max_backoff: Duration::from_secs(60),
            breaker: None,
            fallback: FallbackStrategy::RuleBasedProcessing,
        }
    }

    /// Policy for payment processing: minimal retries, humans take over fast.
    pub fn payment_processing() -> Self {
        Self {
            name: PolicyName::PaymentProcessing,
            max_retries: 2,
            backoff: BackoffStrategy::Constant,
            multiplier: 1,
            max_backoff: Duration::from_secs(30),
            breaker: None,
            fallback: FallbackStrategy::ManualReview,
        }
    }
}

/// Registry mapping policy names to retry behavior.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<PolicyName, RetryPolicy>,
}

impl PolicyRegistry {
    /// Registry with no policies; every lookup resolves to `no_policy`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the stock integration policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(RetryPolicy::erp_connection());
        registry.register(RetryPolicy::ai_service());
        registry.register(RetryPolicy::payment_processing());
        registry
    }

    /// Registers a policy, replacing any previous entry under the same name.
    pub fn register(&mut self, policy: RetryPolicy) {
        self.policies.insert(policy.name, policy);
    }

    pub fn get(&self, name: PolicyName) -> Option<&RetryPolicy> {
        self.policies.get(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = PolicyName> + '_ {
        self.policies.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
