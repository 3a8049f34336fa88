//! Lifecycle listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::OrganizationId;
use event_log::EventLog;
use lifecycle::{LifecycleState, LifecycleStats};
use serde::{Deserialize, Serialize};

use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct LifecycleListQuery {
    pub organization_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleListResponse {
    pub lifecycles: Vec<LifecycleState>,
    pub stats: LifecycleStats,
}

/// GET /lifecycles?organization_id= — an organization's lifecycles together
/// with aggregate statistics. Defaults to the default organization.
#[tracing::instrument(skip(state, query))]
pub async fn list<L: EventLog + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<LifecycleListQuery>,
) -> Json<LifecycleListResponse> {
    let organization_id = query
        .organization_id
        .as_deref()
        .map(OrganizationId::from)
        .unwrap_or_default();

    let mut lifecycles = state.lifecycle.list_for_org(&organization_id).await;
    lifecycles.sort_by_key(|l| l.start_time);
    let stats = state.lifecycle.stats(&organization_id).await;

    Json(LifecycleListResponse { lifecycles, stats })
}
