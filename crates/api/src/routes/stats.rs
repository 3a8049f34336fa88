//! System statistics endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_log::{EventLog, LogStats};
use processor::ProcessorStats;
use recovery::{CircuitState, PolicyName};
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatsResponse {
    pub event_log: LogStats,
    pub processor: ProcessorStats,
    pub circuits: Vec<CircuitStatusResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatusResponse {
    pub policy: PolicyName,
    pub state: CircuitState,
    pub failure_count: u32,
}

/// GET /stats — event log, processor, and circuit breaker statistics.
#[tracing::instrument(skip(state))]
pub async fn get<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<SystemStatsResponse> {
    let circuits = state
        .executor
        .circuit_status()
        .into_iter()
        .map(|(policy, status)| CircuitStatusResponse {
            policy,
            state: status.state,
            failure_count: status.failure_count,
        })
        .collect();

    Json(SystemStatsResponse {
        event_log: state.log.stats().await,
        processor: state.processor.stats().await,
        circuits,
    })
}
