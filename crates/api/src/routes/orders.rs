//! Order placement, event recording, and per-order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AggregateId, OrganizationId};
use event_log::{Event, EventLog, EventType};
use lifecycle::{LifecycleManager, LifecycleState};
use processor::{DerivedOrderState, StreamProcessor, UNKNOWN_STATE};
use recovery::RetryExecutor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: EventLog> {
    pub log: L,
    pub processor: Arc<StreamProcessor<L>>,
    pub lifecycle: Arc<LifecycleManager<L>>,
    pub executor: Arc<RetryExecutor>,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub organization_id: Option<String>,
    /// Remaining body fields become the ORDER_PLACED payload.
    #[serde(flatten)]
    pub order: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub event_type: String,
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
pub struct BlockerRequest {
    pub blocker: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedResponse {
    pub aggregate_id: String,
    pub event_id: String,
    pub state: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecordedResponse {
    pub event_id: String,
    pub state: String,
}

// -- Handlers --

/// POST /orders — place a new order.
///
/// Appends ORDER_PLACED for a fresh aggregate. Fan-out is synchronous, so
/// the state in the response already reflects every follow-on the engine
/// emitted for the placement.
#[tracing::instrument(skip(state, req))]
pub async fn place<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let aggregate_id = AggregateId::new();
    let organization_id = req
        .organization_id
        .as_deref()
        .map(OrganizationId::from)
        .unwrap_or_default();

    let event = Event::builder()
        .event_type(EventType::OrderPlaced)
        .aggregate_id(aggregate_id)
        .organization_id(organization_id)
        .payload_raw(Value::Object(req.order))
        .source_component("api")
        .build();
    let event_id = event.event_id;

    state.log.append(event).await?;
    metrics::counter!("api_orders_placed_total").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(OrderPlacedResponse {
            aggregate_id: aggregate_id.to_string(),
            event_id: event_id.to_string(),
            state: current_state(&state, aggregate_id).await,
        }),
    ))
}

/// POST /orders/:id/events — record a domain event against an existing order.
#[tracing::instrument(skip(state, req), fields(event_type = %req.event_type))]
pub async fn record_event<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<RecordEventRequest>,
) -> Result<(StatusCode, Json<EventRecordedResponse>), ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;

    let event_type = EventType::parse(&req.event_type)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown event type: {}", req.event_type)))?;
    if event_type.is_synthetic() {
        return Err(ApiError::BadRequest(format!(
            "{event_type} is emitted by the engine and cannot be recorded directly"
        )));
    }

    // The order must have been placed first; its first event pins the tenant.
    let existing = state.log.events_for(aggregate_id).await?;
    let Some(first) = existing.first() else {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    };

    let event = Event::builder()
        .event_type(event_type)
        .aggregate_id(aggregate_id)
        .organization_id(first.organization_id.clone())
        .payload_raw(req.payload.unwrap_or_else(|| Value::Object(Default::default())))
        .source_component("api")
        .build();
    let event_id = event.event_id;

    state.log.append(event).await?;
    metrics::counter!("api_events_recorded_total", "event_type" => event_type.as_str())
        .increment(1);

    Ok((
        StatusCode::CREATED,
        Json(EventRecordedResponse {
            event_id: event_id.to_string(),
            state: current_state(&state, aggregate_id).await,
        }),
    ))
}

/// GET /orders/:id/state — the processor's derived view of an order.
#[tracing::instrument(skip(state))]
pub async fn get_state<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<DerivedOrderState>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    let derived = state
        .processor
        .order_state(aggregate_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(derived))
}

/// GET /orders/:id/events — full event history for an order, oldest first.
#[tracing::instrument(skip(state))]
pub async fn events<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    let events = state.log.events_for(aggregate_id).await?;
    if events.is_empty() {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    }
    Ok(Json(events))
}

/// GET /orders/:id/lifecycle — the manager's phase view of an order.
#[tracing::instrument(skip(state))]
pub async fn get_lifecycle<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleState>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    let lifecycle = state
        .lifecycle
        .lifecycle_for(aggregate_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No lifecycle for order {id}")))?;
    Ok(Json(lifecycle))
}

/// POST /orders/:id/blockers — add a blocker to an order's lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn add_blocker<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<BlockerRequest>,
) -> Result<(StatusCode, Json<LifecycleState>), ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    state.lifecycle.add_blocker(aggregate_id, req.blocker).await?;
    let lifecycle = load_lifecycle(&state, aggregate_id, &id).await?;
    Ok((StatusCode::CREATED, Json(lifecycle)))
}

/// DELETE /orders/:id/blockers — resolve a blocker on an order's lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn resolve_blocker<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<BlockerRequest>,
) -> Result<Json<LifecycleState>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    state
        .lifecycle
        .resolve_blocker(aggregate_id, &req.blocker)
        .await?;
    let lifecycle = load_lifecycle(&state, aggregate_id, &id).await?;
    Ok(Json(lifecycle))
}

async fn current_state<L: EventLog + Clone + 'static>(
    state: &AppState<L>,
    aggregate_id: AggregateId,
) -> String {
    state
        .processor
        .order_state(aggregate_id)
        .await
        .map(|s| s.current_state)
        .unwrap_or_else(|| UNKNOWN_STATE.to_string())
}

async fn load_lifecycle<L: EventLog + Clone + 'static>(
    state: &AppState<L>,
    aggregate_id: AggregateId,
    id: &str,
) -> Result<LifecycleState, ApiError> {
    state
        .lifecycle
        .lifecycle_for(aggregate_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No lifecycle for order {id}")))
}

fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    Ok(AggregateId::from_uuid(uuid))
}
