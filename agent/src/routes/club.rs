//! Club data maintenance endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use clubsync_engine::{
    club::{CleanupOptions, CleanupReport},
    BackupSnapshot, Error as EngineError,
};
use serde::Deserialize;

use crate::auth::ApiCaller;
use crate::error::Result;
use crate::AppState;

/// Query parameters of a manual cleanup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQuery {
    #[serde(default = "default_true")]
    pub clean_missing_players: bool,
}

fn default_true() -> bool {
    true
}

/// Create club routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}", delete(delete_event_handler))
        .route("/maintenance/cleanup", post(cleanup_handler))
        .route("/backups", get(list_backups_handler).post(create_backup_handler))
        .route("/backups/{id}/restore", post(restore_backup_handler))
}

/// DELETE /events/{id} - Delete an event and all entries recorded for it.
async fn delete_event_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if state.orchestrator.delete_event(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(EngineError::EventNotFound(id).into())
    }
}

/// POST /maintenance/cleanup - Drop orphaned entries.
async fn cleanup_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupReport>> {
    let options = CleanupOptions {
        clean_missing_players: query.clean_missing_players,
    };
    Ok(Json(state.orchestrator.cleanup_orphans(options)?))
}

/// GET /backups - Stored backups, newest first.
async fn list_backups_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
) -> Json<Vec<BackupSnapshot>> {
    Json(state.orchestrator.backups())
}

/// POST /backups - Take a backup now.
async fn create_backup_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
) -> Result<(StatusCode, Json<BackupSnapshot>)> {
    let snapshot = state.orchestrator.create_backup()?;
    tracing::info!(id = %snapshot.id, "Backup created");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// POST /backups/{id}/restore - Write a backup's data back into the store.
async fn restore_backup_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(id): Path<String>,
) -> Result<Json<BackupSnapshot>> {
    let snapshot = state.orchestrator.restore_backup(&id)?;
    tracing::info!(id = %snapshot.id, "Backup restored");
    Ok(Json(snapshot))
}
