//! Sync control endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use clubsync_engine::LogicalKey;
use serde::{Deserialize, Serialize};

use crate::auth::ApiCaller;
use crate::orchestrator::{PullOutcome, PushOutcome, SyncStatus};
use crate::AppState;

/// Query parameters for a manual push.
#[derive(Debug, Default, Deserialize)]
pub struct PushQuery {
    /// Push every synced key even if nothing is dirty
    #[serde(default)]
    pub force: bool,
}

/// Sync state as seen by the UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: SyncStatus,
    pub dirty: Vec<LogicalKey>,
    pub last_pulled: Option<String>,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/pull", post(pull_handler))
        .route("/sync/push", post(push_handler))
        .route("/sync/status", get(status_handler))
}

/// POST /sync/pull - Pull the remote document now.
async fn pull_handler(State(state): State<AppState>, _caller: ApiCaller) -> Json<PullOutcome> {
    Json(state.orchestrator.pull_once().await)
}

/// POST /sync/push - Push local changes now.
async fn push_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Query(query): Query<PushQuery>,
) -> Json<PushOutcome> {
    Json(state.orchestrator.push_now(query.force).await)
}

/// GET /sync/status - Connection state, dirty keys and pull cursor.
async fn status_handler(State(state): State<AppState>, _caller: ApiCaller) -> Json<StatusResponse> {
    let orchestrator = &state.orchestrator;
    Json(StatusResponse {
        status: orchestrator.status(),
        dirty: orchestrator.dirty_keys(),
        last_pulled: orchestrator.pull_cursor(),
    })
}
