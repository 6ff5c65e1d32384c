// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod engine;
pub mod error;
pub mod history;
pub mod lock;
pub mod metrics;
pub mod record;
pub mod status;
pub mod store;

// Provider adapters, config, scheduler and snapshots
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, router, AppState};
pub use crate::bootstrap::SyncRuntime;
pub use crate::engine::{MergeReport, SyncEngine};
pub use crate::error::{RunError, StoreError, SyncError};
pub use crate::history::{SyncHistory, SyncRun, TriggeredBy};
pub use crate::ingest::config::SyncConfig;
pub use crate::ingest::scheduler::{SchedulerCfg, SyncScheduler, SyncStatus, TriggerOutcome};
pub use crate::ingest::types::{
    Fetched, MalformedItem, ObservationMetrics, ProviderAdapter, ProviderObservation,
};
pub use crate::record::{CanonicalModelRecord, ModelStatus, PricePoint};
pub use crate::status::derive_status;

use anyhow::Context;

/// Build the full application router from `load_default()` config: API
/// routes plus `/metrics`. Arms the scheduler unless sync is disabled.
pub async fn app() -> anyhow::Result<axum::Router> {
    let cfg = crate::ingest::config::load_default().context("loading sync config")?;
    let metrics = crate::metrics::Metrics::init(cfg.interval_secs)?;

    let runtime = SyncRuntime::from_config(cfg)
        .await
        .context("building sync runtime")?;
    runtime.start();

    Ok(create_router(AppState::new(runtime.scheduler.clone())).merge(metrics.router()))
}
