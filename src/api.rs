// src/api.rs
//! HTTP surface: trigger, status, scheduler control and read-only model views.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::RunError;
use crate::history::{QualityBreakdown, SyncRun};
use crate::ingest::scheduler::{SyncScheduler, SyncStatus, TriggerOutcome};
use crate::record::{CanonicalModelRecord, PricePoint};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: SyncScheduler,
}

impl AppState {
    pub fn new(scheduler: SyncScheduler) -> Self {
        Self { scheduler }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/sync", post(trigger_sync).get(sync_status))
        .route("/api/v1/scheduler", post(scheduler_control))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/models/{model_id}/pricing", get(pricing_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Alias kept so callers can write `api::router(state)`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResp {
    success: bool,
    message: String,
    run_id: String,
    models_count: usize,
    models_updated: usize,
    pricing_updated: usize,
    invalid_records: usize,
    #[serde(rename = "duration_ms")]
    duration_ms: u64,
    data_quality: f64,
    quality: QualityBreakdown,
    errors: Vec<RunError>,
    timestamp: DateTime<Utc>,
}

impl From<SyncRun> for TriggerResp {
    fn from(run: SyncRun) -> Self {
        let message = if run.success {
            format!(
                "Successfully synced {} models with {} updates",
                run.models_count, run.models_updated
            )
        } else {
            "Sync failed".to_string()
        };
        Self {
            success: run.success,
            message,
            run_id: run.run_id.to_string(),
            models_count: run.models_count,
            models_updated: run.models_updated,
            pricing_updated: run.pricing_updated,
            invalid_records: run.invalid_records,
            duration_ms: run.duration_ms,
            data_quality: run.data_quality_score,
            quality: run.quality,
            errors: run.errors,
            timestamp: run.finished_at.unwrap_or(run.started_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectedResp {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    status: SyncStatus,
}

async fn trigger_sync(State(state): State<AppState>) -> Response {
    match state.scheduler.trigger_sync().await {
        TriggerOutcome::Completed(run) => {
            (StatusCode::OK, Json(TriggerResp::from(run))).into_response()
        }
        TriggerOutcome::Rejected(status) => (
            StatusCode::ACCEPTED,
            Json(RejectedResp {
                success: false,
                message: "Sync already in progress",
                status,
            }),
        )
            .into_response(),
    }
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.scheduler.status())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SchedulerAction {
    Start,
    Stop,
    Status,
}

#[derive(Debug, Deserialize)]
struct SchedulerReq {
    action: SchedulerAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerResp {
    success: bool,
    /// False when the action was a no-op (already started/stopped).
    changed: bool,
    #[serde(flatten)]
    status: SyncStatus,
}

async fn scheduler_control(
    State(state): State<AppState>,
    Json(req): Json<SchedulerReq>,
) -> Json<SchedulerResp> {
    let changed = match req.action {
        SchedulerAction::Start => state.scheduler.start(),
        SchedulerAction::Stop => state.scheduler.stop(),
        SchedulerAction::Status => false,
    };
    Json(SchedulerResp {
        success: true,
        changed,
        status: state.scheduler.status(),
    })
}

#[derive(Debug, Deserialize)]
struct ModelsQuery {
    provider: Option<String>,
}

fn store_unavailable(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::warn!(error = %e, "store read failed");
    (StatusCode::SERVICE_UNAVAILABLE, format!("store unavailable: {e}"))
}

async fn list_models(
    State(state): State<AppState>,
    Query(q): Query<ModelsQuery>,
) -> Result<Json<Vec<CanonicalModelRecord>>, (StatusCode, String)> {
    let mut rows = state
        .scheduler
        .engine()
        .store()
        .list()
        .await
        .map_err(store_unavailable)?;
    if let Some(p) = q.provider.as_deref() {
        let p = crate::record::slugify(p);
        rows.retain(|r| crate::record::slugify(&r.provider_id) == p);
    }
    Ok(Json(rows))
}

async fn pricing_history(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<Vec<PricePoint>>, (StatusCode, String)> {
    let rows = state
        .scheduler
        .engine()
        .store()
        .pricing_history(&model_id)
        .await
        .map_err(store_unavailable)?;
    Ok(Json(rows))
}
