//! Per-policy circuit breakers.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::policy::{CircuitBreakerConfig, PolicyName};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one breaker for statistics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
}

#[derive(Debug)]
struct BreakerRecord {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

impl BreakerRecord {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
        }
    }
}

/// Breakers for every policy that enables one, keyed by policy name.
///
/// The failure count survives the open to half-open transition, so a failed
/// half-open probe is already at the threshold and reopens the breaker on the
/// spot. Only a success resets the count.
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    records: Mutex<HashMap<PolicyName, BreakerRecord>>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gate decision for a policy, applying the open to half-open
    /// transition when the timeout has elapsed since the last failure.
    pub fn check(&self, name: PolicyName, config: &CircuitBreakerConfig) -> CircuitState {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(name).or_insert_with(BreakerRecord::new);
        if record.state == CircuitState::Open
            && let Some(last) = record.last_failure
            && last.elapsed() > config.timeout
        {
            record.state = CircuitState::HalfOpen;
            tracing::debug!(policy = %name, "circuit breaker half-open");
        }
        record.state
    }

    /// Records a failed attempt. Returns `true` when the breaker is now open.
    pub fn record_failure(&self, name: PolicyName, config: &CircuitBreakerConfig) -> bool {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(name).or_insert_with(BreakerRecord::new);
        record.failures += 1;
        record.last_failure = Some(Instant::now());
        if record.failures >= config.threshold {
            if record.state != CircuitState::Open {
                tracing::warn!(policy = %name, failures = record.failures, "circuit breaker opened");
                metrics::counter!("recovery_breaker_opened_total", "policy" => name.as_str())
                    .increment(1);
            }
            record.state = CircuitState::Open;
            true
        } else {
            false
        }
    }

    /// Records a successful attempt, closing the breaker and clearing its
    /// failure count.
    pub fn record_success(&self, name: PolicyName) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&name) {
            record.state = CircuitState::Closed;
            record.failures = 0;
        }
    }

    pub fn status(&self, name: PolicyName) -> Option<BreakerStatus> {
        let records = self.records.lock().unwrap();
        records.get(&name).map(|record| BreakerStatus {
            state: record.state,
            failure_count: record.failures,
        })
    }

    /// Snapshot of every tracked breaker, in stable policy order.
    pub fn statuses(&self) -> Vec<(PolicyName, BreakerStatus)> {
        let records = self.records.lock().unwrap();
        PolicyName::ALL
            .iter()
            .filter_map(|name| {
                records.get(name).map(|record| {
                    (
                        *name,
                        BreakerStatus {
                            state: record.state,
                            failure_count: record.failures,
                        },
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: 3,
            timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_once_failures_reach_the_threshold() {
        let breakers = CircuitBreakers::new();
        let name = PolicyName::ErpConnection;

        assert!(!breakers.record_failure(name, &config()));
        assert!(!breakers.record_failure(name, &config()));
        assert_eq!(breakers.check(name, &config()), CircuitState::Closed);

        assert!(breakers.record_failure(name, &config()));
        assert_eq!(breakers.check(name, &config()), CircuitState::Open);
        assert_eq!(breakers.status(name).unwrap().failure_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_half_opens_after_the_timeout() {
        let breakers = CircuitBreakers::new();
        let name = PolicyName::ErpConnection;
        for _ in 0..3 {
            breakers.record_failure(name, &config());
        }

        assert_eq!(breakers.check(name, &config()), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breakers.check(name, &config()), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_half_open_probe_reopens_immediately() {
        let breakers = CircuitBreakers::new();
        let name = PolicyName::ErpConnection;
        for _ in 0..3 {
            breakers.record_failure(name, &config());
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breakers.check(name, &config()), CircuitState::HalfOpen);

        // Count was not reset, so one more failure is past the threshold.
        assert!(breakers.record_failure(name, &config()));
        assert_eq!(breakers.check(name, &config()), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn success_closes_the_breaker_and_resets_the_count() {
        let breakers = CircuitBreakers::new();
        let name = PolicyName::ErpConnection;
        for _ in 0..3 {
            breakers.record_failure(name, &config());
        }

        breakers.record_success(name);
        let status = breakers.status(name).unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn statuses_lists_only_tracked_policies() {
        let breakers = CircuitBreakers::new();
        breakers.record_failure(PolicyName::ErpConnection, &config());

        let statuses = breakers.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, PolicyName::ErpConnection);
        assert_eq!(statuses[0].1.failure_count, 1);
    }
}
