//! Routing tests for the local API.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use clubsync_agent::transport::MemoryRemote;
use clubsync_agent::{app, AppState, Config, SyncOrchestrator, SyncSettings};
use clubsync_engine::{LogicalKey, MemoryBackend};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    orchestrator: Arc<SyncOrchestrator>,
    remote: Arc<MemoryRemote>,
}

fn test_app(api_token: Option<&str>) -> TestApp {
    let mut config = Config::from_lookup(|_| None).unwrap();
    config.api_token = api_token.map(str::to_string);

    let remote = Arc::new(MemoryRemote::new());
    let orchestrator = SyncOrchestrator::new_shared(
        MemoryBackend::new(),
        remote.clone(),
        SyncSettings::default(),
    );
    let router = app(AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config),
    });

    TestApp {
        router,
        orchestrator,
        remote,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health() {
    let app = test_app(None);

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sync"], "connecting");
}

#[tokio::test]
async fn store_roundtrip_marks_dirty() {
    let app = test_app(None);
    let roster = json!([{"id": "p1", "name": "Jonas"}]);

    let (status, _) = send(&app.router, Method::PUT, "/store/roster", Some(roster.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app.router, Method::GET, "/store/roster", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, roster);

    let (_, body) = send(&app.router, Method::GET, "/sync/status", None).await;
    assert_eq!(body["dirty"], json!(["roster"]));
    assert_eq!(body["lastPulled"], Value::Null);
}

#[tokio::test]
async fn missing_key_reads_as_empty_default() {
    let app = test_app(None);

    let (_, body) = send(&app.router, Method::GET, "/store/attendance", None).await;
    assert_eq!(body, json!({}));

    let (_, body) = send(&app.router, Method::GET, "/store/events", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unknown_key_is_not_found() {
    let app = test_app(None);

    let (status, body) = send(&app.router, Method::GET, "/store/termine", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown key: termine");
}

#[tokio::test]
async fn reset_key() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Roster, &json!([{"id": "p1"}]))
        .unwrap();

    let (status, _) = send(&app.router, Method::DELETE, "/store/roster", None).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.orchestrator.read_value(LogicalKey::Roster), Some(json!([])));
}

#[tokio::test]
async fn manual_push_and_pull() {
    let app = test_app(None);
    app.orchestrator.write(LogicalKey::Season, "2025/26").unwrap();

    let (status, body) = send(&app.router, Method::POST, "/sync/push", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "pushed");
    assert_eq!(body["cleared"], json!(["season"]));

    let (_, body) = send(&app.router, Method::POST, "/sync/push", None).await;
    assert_eq!(body["outcome"], "clean");

    let (_, body) = send(&app.router, Method::POST, "/sync/push?force=true", None).await;
    assert_eq!(body["outcome"], "pushed");
    assert_eq!(app.remote.set_calls(), 2);

    let (_, body) = send(&app.router, Method::POST, "/sync/pull", None).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["updatedAt"], MemoryRemote::stamp_for(2));

    let (_, body) = send(&app.router, Method::GET, "/sync/status", None).await;
    assert_eq!(body["status"], "live");
}

#[tokio::test]
async fn delete_event_cascades() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Events, &json!([{"id": "e1"}, {"id": "e2"}]))
        .unwrap();
    app.orchestrator
        .write(LogicalKey::Attendance, &json!({"e1": {"p1": true}, "e2": {}}))
        .unwrap();

    let (status, _) = send(&app.router, Method::DELETE, "/events/e1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Attendance),
        Some(json!({"e2": {}}))
    );

    let (status, _) = send(&app.router, Method::DELETE, "/events/e1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cleanup_endpoint() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Events, &json!([{"id": "e1"}]))
        .unwrap();
    app.orchestrator
        .write(LogicalKey::Roster, &json!([{"id": "p1"}]))
        .unwrap();
    app.orchestrator
        .write(
            LogicalKey::Ratings,
            &json!({"e1": {"p1": {}, "p2": {}}, "e9": {"p1": {}}}),
        )
        .unwrap();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/maintenance/cleanup?cleanMissingPlayers=false",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removedEvents"], 1);
    assert_eq!(body["removedPlayers"], 0);

    let (_, body) = send(&app.router, Method::POST, "/maintenance/cleanup", None).await;
    assert_eq!(body["removedPlayers"], 1);
    assert_eq!(body["changedKeys"], json!(["ratings"]));
}

#[tokio::test]
async fn backup_create_list_restore() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Roster, &json!([{"id": "p1"}]))
        .unwrap();

    let (status, created) = send(&app.router, Method::POST, "/backups", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["payload"]["roster"], json!([{"id": "p1"}]));

    let (_, list) = send(&app.router, Method::GET, "/backups", None).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    app.orchestrator.reset(LogicalKey::Roster).unwrap();
    let id = created["id"].as_str().unwrap();
    let (status, _) = send(
        &app.router,
        Method::POST,
        &format!("/backups/{}/restore", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Roster),
        Some(json!([{"id": "p1"}]))
    );

    let (status, _) = send(&app.router, Method::POST, "/backups/nope/restore", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_token_is_enforced() {
    let app = test_app(Some("ui-token"));

    let (status, _) = send(&app.router, Method::GET, "/sync/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/sync/status")
        .header(AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/sync/status")
        .header(AUTHORIZATION, "Bearer ui-token")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // health stays open for probes
    let (status, _) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_event_keeps_existing_records() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Events, &json!([{"id": "e1", "title": "Derby"}]))
        .unwrap();

    let new_event = json!({
        "team": "first-team", "kind": "training", "title": "Training",
        "date": "2025-09-01", "time": "19:00", "season": "2025/26"
    });
    let (status, created) = send(&app.router, Method::POST, "/events", Some(new_event)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["id"].as_str().unwrap().starts_with("event_"));

    let (status, events) = send(&app.router, Method::GET, "/events", None).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["id"], "e1");
    assert_eq!(events[0]["title"], "Derby");
    assert_eq!(events[1]["id"], created["id"]);
}

#[tokio::test]
async fn per_event_entries() {
    let app = test_app(None);

    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/events/e1/attendance/p1",
        Some(json!(true)),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let rating = json!({"gameIntelligence": 2, "fitness": 1, "technique": 3, "understanding": 2});
    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/events/e1/ratings/p1",
        Some(rating),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let lineup = json!({"starterIds": ["p1"], "benchIds": []});
    let (status, _) = send(&app.router, Method::PUT, "/events/e1/lineup", Some(lineup.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Attendance),
        Some(json!({"e1": {"p1": true}}))
    );
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Ratings).unwrap()["e1"]["p1"]["technique"],
        3
    );
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Lineups),
        Some(json!({"e1": lineup}))
    );
}

#[tokio::test]
async fn invalid_records_are_bad_requests() {
    let app = test_app(None);

    let rating = json!({"gameIntelligence": 0, "fitness": 1, "technique": 3, "understanding": 2});
    let (status, body) = send(
        &app.router,
        Method::PUT,
        "/events/e1/ratings/p1",
        Some(rating),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid record: grades must be between 1 and 6");

    let player = json!({"id": "p2", "team": "second-team", "name": "Maik", "position": "TW"});
    let (status, _) = send(&app.router, Method::PUT, "/players/p1", Some(player)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.orchestrator.dirty_keys().is_empty());
}

#[tokio::test]
async fn players_and_fitness_tests() {
    let app = test_app(None);

    let player = json!({"id": "p1", "team": "first-team", "name": "Jonas", "position": "ST"});
    let (status, _) = send(&app.router, Method::PUT, "/players/p1", Some(player.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::Roster),
        Some(json!([player]))
    );

    let entry = json!({"test": "shuttle", "dateISO": "2025-05-01", "value": 1800.0});
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/players/p1/fitness-tests",
        Some(entry.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"grade": "standard", "label": "Standard"}));
    assert_eq!(
        app.orchestrator.read_value(LogicalKey::FitnessTests),
        Some(json!({"p1": [entry]}))
    );
}

#[tokio::test]
async fn grade_without_storing() {
    let app = test_app(None);

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/fitness/grade?test=cooper&value=3001",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"grade": "very-good", "label": "Very good"}));
    assert!(app.orchestrator.dirty_keys().is_empty());
}

#[tokio::test]
async fn reset_lineups_to_empty_map() {
    let app = test_app(None);
    app.orchestrator
        .write(LogicalKey::Lineups, &json!({"e1": {"starterIds": [], "benchIds": []}}))
        .unwrap();

    let (status, _) = send(&app.router, Method::DELETE, "/store/lineups", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app.router, Method::GET, "/store/lineups", None).await;
    assert_eq!(body, json!({}));
    assert_eq!(app.orchestrator.read_value(LogicalKey::Lineups), Some(json!({})));
}
