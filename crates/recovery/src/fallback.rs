//! Degraded-mode fallbacks.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::OperationError;

/// What to do when retries are exhausted or the breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Answer from the local cache and queue the work for a later sync.
    CachedDataWithQueueSync,
    /// Answer with deterministic rules instead of the AI service.
    RuleBasedProcessing,
    /// Park the work for a human.
    ManualReview,
}

impl FallbackStrategy {
    /// Human-readable strategy description, as shown in policy listings.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::CachedDataWithQueueSync => "Use cached data and queue for sync",
            Self::RuleBasedProcessing => "Fallback to rule-based processing",
            Self::ManualReview => "Queue for manual review",
        }
    }
}

/// Executes a fallback strategy for a failed operation.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    async fn run(
        &self,
        strategy: FallbackStrategy,
        context: &Value,
    ) -> Result<Value, OperationError>;
}

/// In-process handler backing the stock strategies.
///
/// Cached-data and manual-review contexts are parked in in-memory queues; a
/// deployment drains them into the sync pipeline and the review tooling.
#[derive(Debug, Default)]
pub struct BuiltinFallbacks {
    sync_queue: Mutex<Vec<Value>>,
    review_queue: Mutex<Vec<Value>>,
    fail_on_run: Mutex<bool>,
}

impl BuiltinFallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts queued for ERP sync once the connection returns.
    pub fn queued_for_sync(&self) -> Vec<Value> {
        self.sync_queue.lock().unwrap().clone()
    }

    /// Contexts parked for manual review.
    pub fn queued_for_review(&self) -> Vec<Value> {
        self.review_queue.lock().unwrap().clone()
    }

    /// Makes every subsequent `run` fail, to exercise the fallback-failed
    /// path.
    pub fn set_fail_on_run(&self, fail: bool) {
        *self.fail_on_run.lock().unwrap() = fail;
    }
}

#[async_trait]
impl FallbackHandler for BuiltinFallbacks {
    async fn run(
        &self,
        strategy: FallbackStrategy,
        context: &Value,
    ) -> Result<Value, OperationError> {
        if *self.fail_on_run.lock().unwrap() {
            return Err(OperationError::new("fallback unavailable"));
        }
        match strategy {
            FallbackStrategy::CachedDataWithQueueSync => {
                self.sync_queue.lock().unwrap().push(context.clone());
                tracing::info!("serving cached data, queued context for sync");
                Ok(json!({"message": "Using cached data, queued for sync"}))
            }
            FallbackStrategy::RuleBasedProcessing => {
                tracing::info!("falling back to rule-based processing");
                Ok(json!({"message": "Using rule-based processing"}))
            }
            FallbackStrategy::ManualReview => {
                self.review_queue.lock().unwrap().push(context.clone());
                tracing::info!("queued context for manual review");
                Ok(json!({"message": "Queued for manual review"}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_data_strategy_queues_the_context() {
        let fallbacks = BuiltinFallbacks::new();
        let context = json!({"orderId": "order-1"});

        let result = fallbacks
            .run(FallbackStrategy::CachedDataWithQueueSync, &context)
            .await
            .unwrap();

        assert_eq!(result["message"], "Using cached data, queued for sync");
        assert_eq!(fallbacks.queued_for_sync(), vec![context]);
        assert!(fallbacks.queued_for_review().is_empty());
    }

    #[tokio::test]
    async fn manual_review_strategy_parks_the_context() {
        let fallbacks = BuiltinFallbacks::new();
        let context = json!({"paymentId": "pay-9"});

        let result = fallbacks
            .run(FallbackStrategy::ManualReview, &context)
            .await
            .unwrap();

        assert_eq!(result["message"], "Queued for manual review");
        assert_eq!(fallbacks.queued_for_review().len(), 1);
    }

    #[tokio::test]
    async fn rule_based_strategy_answers_without_queueing() {
        let fallbacks = BuiltinFallbacks::new();
        let result = fallbacks
            .run(FallbackStrategy::RuleBasedProcessing, &json!({}))
            .await
            .unwrap();

        assert_eq!(result["message"], "Using rule-based processing");
        assert!(fallbacks.queued_for_sync().is_empty());
    }

    #[tokio::test]
    async fn fail_hook_surfaces_an_operation_error() {
        let fallbacks = BuiltinFallbacks::new();
        fallbacks.set_fail_on_run(true);

        let err = fallbacks
            .run(FallbackStrategy::RuleBasedProcessing, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "fallback unavailable");
    }

    #[test]
    fn strategy_descriptions_match_policy_listings() {
        assert_eq!(
            FallbackStrategy::CachedDataWithQueueSync.describe(),
            "Use cached data and queue for sync"
        );
        assert_eq!(
            FallbackStrategy::ManualReview.describe(),
            "Queue for manual review"
        );
    }
}
