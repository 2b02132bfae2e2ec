//! HTTP surface tests

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use reconciler::models::platform::Platform;
use reconciler::server::serve::router;
use reconciler::server::state::ServerState;

use crate::harness;
use crate::stubs::{all_connected, StubAdapter};

async fn app(stubs: &[Arc<StubAdapter>]) -> Router {
    let state = harness(stubs, 5).await;
    router(Arc::new(ServerState::from_app_state(&state)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = app(&[]).await;

    let (status, body) = call(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_phase_out_of_range_is_bad_request() {
    let stubs = all_connected();
    let app = app(&stubs).await;

    let (status, body) = call(&app, "POST", "/setup/phase/8", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");
    assert!(stubs.iter().all(|s| s.calls() == 0));
}

#[tokio::test]
async fn test_run_phase_and_status() {
    let app = app(&all_connected()).await;

    let (status, body) = call(&app, "POST", "/setup/phase/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "completed");

    let (_, body) = call(&app, "GET", "/setup/status", None).await;
    let phases = body["data"].as_array().unwrap();
    assert_eq!(phases.len(), 7);
    assert_eq!(phases[2]["status"], "completed");
    assert_eq!(phases[0]["status"], "pending");
}

#[tokio::test]
async fn test_status_and_fix() {
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity).fixable());
    let app = app(&[identity]).await;

    let (status, body) = call(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["overall"], "errored");

    let (_, body) = call(&app, "GET", "/errors", None).await;
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["errors"][0]["stale"], false);

    let (status, body) = call(&app, "POST", "/sync/fix", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["fixed"][0], "Identity re-authenticated");

    let (_, body) = call(&app, "GET", "/errors", None).await;
    assert_eq!(body["data"]["count"], 0);
}

#[tokio::test]
async fn test_resolve_unknown_error_is_not_found() {
    let app = app(&[]).await;

    let (status, body) = call(&app, "POST", "/errors/missing/resolve", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_purge_uses_retention_default() {
    let app = app(&[]).await;

    let (status, body) = call(&app, "POST", "/errors/purge", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 0);

    let (status, _) = call(&app, "POST", "/errors/purge?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_purge_compacts_status_history() {
    let app = app(&[]).await;
    call(&app, "GET", "/status", None).await;
    call(&app, "GET", "/status", None).await;

    let (status, body) = call(&app, "POST", "/errors/purge?days=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["compacted"].as_u64().unwrap() >= 2);

    let (_, body) = call(&app, "POST", "/errors/purge?days=0", None).await;
    assert_eq!(body["data"]["compacted"], 0);
}

#[tokio::test]
async fn test_deployments_trigger_and_list() {
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting));
    let app = app(&[hosting]).await;

    let (status, body) = call(
        &app,
        "POST",
        "/deployments/trigger",
        Some(serde_json::json!({ "branch": "main" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "dpl_1");

    let (_, body) = call(&app, "GET", "/deployments", None).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = call(&app, "GET", "/deployments/metrics", None).await;
    assert_eq!(body["data"]["total_deployments"], 1);
}

#[tokio::test]
async fn test_validate_rejects_bad_url() {
    let app = app(&[]).await;

    let (status, body) = call(
        &app,
        "POST",
        "/deployments/validate",
        Some(serde_json::json!({ "url": "ftp://portal.example.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
