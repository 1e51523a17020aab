//! Club record endpoints: events, players and per-event entries.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use clubsync_engine::club::{
    self, Event, FitnessTestEntry, Lineup, MatchStats, NewEvent, Player, Rating, TestGrade,
    TestKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::ApiCaller;
use crate::error::{AgentError, Result};
use crate::AppState;

/// A graded fitness-test value.
#[derive(Debug, Serialize)]
pub struct GradeResponse {
    pub grade: TestGrade,
    pub label: &'static str,
}

impl From<TestGrade> for GradeResponse {
    fn from(grade: TestGrade) -> Self {
        Self {
            grade,
            label: grade.label(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GradeQuery {
    pub test: TestKind,
    pub value: f64,
}

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events_handler).post(create_event_handler))
        .route(
            "/events/{id}/attendance/{player_id}",
            put(attendance_handler),
        )
        .route("/events/{id}/ratings/{player_id}", put(rating_handler))
        .route(
            "/events/{id}/match-stats/{player_id}",
            put(match_stats_handler),
        )
        .route("/events/{id}/lineup", put(lineup_handler))
        .route("/players/{id}", put(upsert_player_handler))
        .route("/players/{id}/fitness-tests", post(fitness_test_handler))
        .route("/fitness/grade", get(grade_handler))
}

/// GET /events - Stored events, season filled in.
async fn list_events_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(state.orchestrator.events()?))
}

/// POST /events - Create an event with a fresh id.
async fn create_event_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Json(new): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let event = state.orchestrator.create_event(new)?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn attendance_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path((event_id, player_id)): Path<(String, String)>,
    Json(present): Json<bool>,
) -> Result<StatusCode> {
    state
        .orchestrator
        .set_attendance(&event_id, &player_id, present)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rating_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path((event_id, player_id)): Path<(String, String)>,
    Json(rating): Json<Rating>,
) -> Result<StatusCode> {
    state.orchestrator.set_rating(&event_id, &player_id, &rating)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn match_stats_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path((event_id, player_id)): Path<(String, String)>,
    Json(stats): Json<MatchStats>,
) -> Result<StatusCode> {
    state
        .orchestrator
        .set_match_stats(&event_id, &player_id, &stats)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn lineup_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(event_id): Path<String>,
    Json(lineup): Json<Lineup>,
) -> Result<StatusCode> {
    state.orchestrator.set_lineup(&event_id, &lineup)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /players/{id} - Add or replace a roster entry.
async fn upsert_player_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(id): Path<String>,
    Json(player): Json<Player>,
) -> Result<StatusCode> {
    if player.id != id {
        return Err(AgentError::BadRequest(format!(
            "player id {} does not match path {}",
            player.id, id
        )));
    }
    state.orchestrator.upsert_player(&player)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /players/{id}/fitness-tests - Record a result and return its grade.
async fn fitness_test_handler(
    State(state): State<AppState>,
    _caller: ApiCaller,
    Path(player_id): Path<String>,
    Json(entry): Json<FitnessTestEntry>,
) -> Result<(StatusCode, Json<GradeResponse>)> {
    let grade = state.orchestrator.add_fitness_test(&player_id, &entry)?;
    Ok((StatusCode::CREATED, Json(grade.into())))
}

/// GET /fitness/grade?test=cooper&value=2900 - Grade a value without storing it.
async fn grade_handler(
    _caller: ApiCaller,
    Query(query): Query<GradeQuery>,
) -> Result<Json<GradeResponse>> {
    if !query.value.is_finite() {
        return Err(AgentError::BadRequest("value must be a finite number".into()));
    }
    Ok(Json(club::classify_test(query.test, query.value).into()))
}
