//! Key-value access to the local store.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use clubsync_engine::LogicalKey;
use serde_json::Value;

use crate::auth::ApiCaller;
use crate::error::Result;
use crate::AppState;

/// Create store routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/store/{key}",
        get(read_handler).put(write_handler).delete(reset_handler),
    )
}

/// GET /store/{key} - Current value, or the empty default of its shape.
async fn read_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let key: LogicalKey = key.parse()?;
    let value = state
        .orchestrator
        .read_value(key)
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| key.empty_default());
    Ok(Json(value))
}

/// PUT /store/{key} - Replace the value and schedule a push.
async fn write_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode> {
    let key: LogicalKey = key.parse()?;
    state.orchestrator.write(key, &value)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /store/{key} - Reset to the empty default.
async fn reset_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    let key: LogicalKey = key.parse()?;
    state.orchestrator.reset(key)?;
    Ok(StatusCode::NO_CONTENT)
}
