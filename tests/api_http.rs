// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/v1/sync      (trigger, 200 + counts; 202 while a run is in flight)
// - GET  /api/v1/sync      (status keys)
// - POST /api/v1/scheduler (start / stop / status, bad action)
// - GET  /api/v1/models    (+ provider filter, pricing history)

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tokio::sync::Notify;
use tower::ServiceExt as _; // for `oneshot`

use common::*;
use model_status_sync::api::{self, AppState};
use model_status_sync::ingest::DynAdapter;
use model_status_sync::store::MemoryStore;
use model_status_sync::{SyncEngine, SyncScheduler};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_scheduler() -> SyncScheduler {
    let engine = SyncEngine::new(
        vec![
            StaticAdapter::shared(
                "openai",
                vec![
                    obs("openai", "gpt-4o").complete().avail(99.5),
                    obs("openai", "gpt-4o-mini").prices(0.15, 0.6).avail(50.0),
                ],
            ),
            StaticAdapter::shared("anthropic", vec![obs("anthropic", "claude").avail(0.0)]),
        ],
        Arc::new(MemoryStore::new()),
    );
    scheduler_with(engine, Duration::from_secs(1800), false)
}

/// Build the same Router the binary uses.
fn test_router(sched: SyncScheduler) -> Router {
    api::router(AppState::new(sched))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn send_json(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let (status, bytes) = send(app, method, uri, body).await;
    let v: Json = serde_json::from_slice(&bytes).expect("valid JSON body");
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (status, bytes) = send(test_router(test_scheduler()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "OK");
}

#[tokio::test]
async fn api_trigger_returns_counts_and_message() {
    let (status, v) =
        send_json(test_router(test_scheduler()), "POST", "/api/v1/sync", None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(v["success"], json!(true));
    assert_eq!(v["modelsCount"], json!(3));
    assert_eq!(v["modelsUpdated"], json!(3));
    assert_eq!(v["pricingUpdated"], json!(2));
    assert_eq!(v["message"], json!("Successfully synced 3 models with 3 updates"));
    for key in ["runId", "duration_ms", "dataQuality", "quality", "errors", "timestamp"] {
        assert!(v.get(key).is_some(), "missing key {key}: {v}");
    }
    // 1 of 3 complete, no errors
    assert_eq!(v["dataQuality"], json!(33.3));
    assert_eq!(v["quality"]["withPricing"], json!(67));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_trigger_while_syncing_returns_202_with_status() {
    let gate = Arc::new(Notify::new());
    let adapter: DynAdapter = Arc::new(GatedAdapter {
        id: "openai".into(),
        gate: gate.clone(),
        observations: vec![obs("openai", "gpt-4o").avail(99.0)],
    });
    let sched = scheduler_with(
        SyncEngine::new(vec![adapter], Arc::new(MemoryStore::new())),
        Duration::from_secs(1800),
        false,
    );

    let first = {
        let app = test_router(sched.clone());
        tokio::spawn(async move { send_json(app, "POST", "/api/v1/sync", None).await })
    };
    assert!(wait_until(|| sched.status().is_syncing).await, "first run never started");

    let (status, v) = send_json(test_router(sched.clone()), "POST", "/api/v1/sync", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(v["success"], json!(false));
    assert_eq!(v["isSyncing"], json!(true));
    assert_eq!(v["message"], json!("Sync already in progress"));

    gate.notify_one();
    let (status, v) = first.await.expect("first request task");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(sched.history().len(), 1, "rejected trigger leaves no run behind");
}

#[tokio::test]
async fn api_status_reflects_the_last_run() {
    let sched = test_scheduler();
    let (_, run) = send_json(test_router(sched.clone()), "POST", "/api/v1/sync", None).await;

    let (status, v) = send_json(test_router(sched), "GET", "/api/v1/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["isSyncing"], json!(false));
    assert_eq!(v["schedulerArmed"], json!(false));
    assert!(v["nextSyncIn_ms"].is_null(), "timer not armed: {v}");
    assert_eq!(v["lastSync"]["runId"], run["runId"]);
    assert_eq!(v["lastSync"]["triggeredBy"], json!("manual"));
    assert_eq!(v["history"].as_array().map(Vec::len), Some(1));
    assert!(v.get("currentRun").is_none());
}

#[tokio::test]
async fn api_scheduler_start_stop_and_status() {
    let sched = test_scheduler();

    let (status, v) = send_json(
        test_router(sched.clone()),
        "POST",
        "/api/v1/scheduler",
        Some(json!({ "action": "start" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["changed"], json!(true));
    assert_eq!(v["schedulerArmed"], json!(true));
    assert_eq!(v["nextSyncIn_ms"].as_u64().map(|ms| ms > 0), Some(true));

    let (_, v) = send_json(
        test_router(sched.clone()),
        "POST",
        "/api/v1/scheduler",
        Some(json!({ "action": "status" })),
    )
    .await;
    assert_eq!(v["changed"], json!(false));
    assert_eq!(v["schedulerArmed"], json!(true));

    let (_, v) = send_json(
        test_router(sched.clone()),
        "POST",
        "/api/v1/scheduler",
        Some(json!({ "action": "stop" })),
    )
    .await;
    assert_eq!(v["changed"], json!(true));
    assert_eq!(v["schedulerArmed"], json!(false));
    assert!(!sched.is_armed());
}

#[tokio::test]
async fn api_scheduler_rejects_unknown_action() {
    let (status, _) = send(
        test_router(test_scheduler()),
        "POST",
        "/api/v1/scheduler",
        Some(json!({ "action": "restart" })),
    )
    .await;
    assert!(status.is_client_error(), "got {status}");
}

#[tokio::test]
async fn api_models_list_filters_by_provider() {
    let sched = test_scheduler();
    send(test_router(sched.clone()), "POST", "/api/v1/sync", None).await;

    let (status, v) = send_json(test_router(sched.clone()), "GET", "/api/v1/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(Vec::len), Some(3));

    let (_, v) = send_json(
        test_router(sched.clone()),
        "GET",
        "/api/v1/models?provider=anthropic",
        None,
    )
    .await;
    let rows = v.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["modelId"], json!("anthropic-claude"));
    assert_eq!(rows[0]["status"], json!("outage"));

    let (status, v) = send_json(
        test_router(sched),
        "GET",
        "/api/v1/models/openai-gpt-4o-mini/pricing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let points = v.as_array().expect("array");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["inputPrice"], json!(0.15));
}
