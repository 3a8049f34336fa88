//! HTTP API server for the order orchestration engine.
//!
//! Provides REST endpoints for placing orders, recording domain events, and
//! reading the derived views, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use common::{AuditSink, TracingAuditSink};
use event_log::EventLog;
use lifecycle::{Collaborators, InMemoryMrpEngine, InMemoryRuleEngine, LifecycleManager, TracingNotifier};
use metrics_exporter_prometheus::PrometheusHandle;
use processor::StreamProcessor;
use recovery::RetryExecutor;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: EventLog + Clone + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<L>))
        .route("/orders/{id}/events", post(routes::orders::record_event::<L>))
        .route("/orders/{id}/events", get(routes::orders::events::<L>))
        .route("/orders/{id}/state", get(routes::orders::get_state::<L>))
        .route("/orders/{id}/lifecycle", get(routes::orders::get_lifecycle::<L>))
        .route("/orders/{id}/blockers", post(routes::orders::add_blocker::<L>))
        .route("/orders/{id}/blockers", delete(routes::orders::resolve_blocker::<L>))
        .route("/lifecycles", get(routes::lifecycles::list::<L>))
        .route("/stats", get(routes::stats::get::<L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: a stream processor and a lifecycle
/// manager attached to `log`, with in-memory rule and MRP engines standing in
/// for the real services.
///
/// The processor subscribes before the manager, so for each event the
/// reactions are decided before the lifecycle observes it.
pub async fn create_default_state<L: EventLog + Clone + 'static>(log: L) -> Arc<AppState<L>> {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let processor = StreamProcessor::attach(log.clone()).await;

    let executor = Arc::new(RetryExecutor::with_defaults(audit.clone()));
    let collaborators = Collaborators {
        rules: Arc::new(InMemoryRuleEngine::new()),
        mrp: Arc::new(InMemoryMrpEngine::new()),
        notifier: Arc::new(TracingNotifier),
        audit,
        executor: executor.clone(),
    };
    let lifecycle = LifecycleManager::attach(log.clone(), collaborators).await;

    Arc::new(AppState {
        log,
        processor,
        lifecycle,
        executor,
    })
}
