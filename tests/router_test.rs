use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use gha_dashboard::config::DashboardConfig;
use gha_dashboard::model::Run;
use gha_dashboard::server::build_router;
use gha_dashboard::session::SessionPhase;
use gha_dashboard::state::{DashboardState, SharedState};

fn test_state() -> SharedState {
    let config = DashboardConfig {
        port: 9880,
        backend_url: "ws://127.0.0.1:1".to_string(),
        fallback_url: "http://127.0.0.1:1".to_string(),
        cache_db: PathBuf::from("/tmp/unused/runs.db"),
        token: None,
    };
    Arc::new(DashboardState::in_memory(config).unwrap())
}

fn sample_run(id: i64, conclusion: &str) -> Run {
    Run::from_value(&json!({
        "id": id,
        "workflow_name": "CI",
        "branch": "main",
        "created_at": "2025-03-01T09:00:00Z",
        "conclusion": conclusion,
        "duration": 100.0,
    }))
    .unwrap()
}

async fn get(state: &SharedState, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(state: &SharedState, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = test_state();
    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["phase"], "idle");
}

#[tokio::test]
async fn test_session_start_busy_response() {
    let state = test_state();
    {
        let mut session = state.session.write().await;
        session.begin("busy/owner", None);
        session.phase = SessionPhase::StreamingRuns;
    }

    let (status, body) = post(&state, "/session/start", json!({"repo": "other/repo"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["busy"], true);
    assert_eq!(body["current_repo"], "busy/owner");
}

#[tokio::test]
async fn test_session_start_cached_response() {
    let state = test_state();
    let runs = vec![sample_run(1, "success"), sample_run(2, "failure")];
    state.cache.store_runs("o/r", &runs, true).unwrap();

    let (status, body) = post(&state, "/session/start", json!({"repo": "o/r"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["cached"], true);
    assert_eq!(body["is_complete"], true);
    assert_eq!(body["item_count"], 2);
}

#[tokio::test]
async fn test_session_start_invalid_repo() {
    let state = test_state();
    let (status, body) = post(&state, "/session/start", json!({"repo": "nonsense"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nonsense"));
}

#[tokio::test]
async fn test_session_status_reflects_idle() {
    let state = test_state();
    let (status, body) = get(&state, "/session/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_streaming"], false);
    assert_eq!(body["phase"], "idle");
}

#[tokio::test]
async fn test_cache_status_unknown_repo() {
    let state = test_state();
    let (status, body) = get(&state, "/cache/status?repo=o%2Fr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], false);
    assert_eq!(body["total_runs"], 0);
}

#[tokio::test]
async fn test_cache_status_known_repo() {
    let state = test_state();
    state
        .cache
        .store_runs("o/r", &[sample_run(1, "success")], true)
        .unwrap();
    let (status, body) = get(&state, "/cache/status?repo=o%2Fr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], true);
    assert_eq!(body["total_runs"], 1);
    assert_eq!(body["is_complete"], true);
}

#[tokio::test]
async fn test_cache_clear() {
    let state = test_state();
    state
        .cache
        .store_runs("o/r", &[sample_run(1, "success")], true)
        .unwrap();
    state
        .store
        .write()
        .await
        .merge("o/r", vec![sample_run(1, "success")]);

    let (status, body) = post(&state, "/cache/clear", json!({"repo": "o/r"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(state.store.read().await.is_empty("o/r"));
    assert!(!state.cache.cache_status("o/r").unwrap().exists);
}

#[tokio::test]
async fn test_dashboard_serves_filtered_view() {
    let state = test_state();
    state.store.write().await.merge(
        "o/r",
        vec![sample_run(1, "success"), sample_run(2, "failure")],
    );

    let (status, body) = get(&state, "/dashboard?repo=o%2Fr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_runs"], 2);
    assert_eq!(body["success_rate"], 0.5);

    // Branch filter that matches nothing
    let (_, body) = get(&state, "/dashboard?repo=o%2Fr&branch=release").await;
    assert_eq!(body["total_runs"], 0);
    // Dropdowns still list what exists
    assert_eq!(body["branches"][1], "main");
}

#[tokio::test]
async fn test_dashboard_rehydrates_from_cache() {
    let state = test_state();
    state
        .cache
        .store_runs("o/r", &[sample_run(1, "success")], true)
        .unwrap();

    let (status, body) = get(&state, "/dashboard?repo=o%2Fr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_runs"], 1);
    // The store is now warm
    assert_eq!(state.store.read().await.len("o/r"), 1);
}

#[tokio::test]
async fn test_dashboard_unknown_repo_is_empty_view() {
    let state = test_state();
    let (status, body) = get(&state, "/dashboard?repo=nobody%2Fnothing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_runs"], 0);
}
