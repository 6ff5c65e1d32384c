//! Model status sync service: binary entrypoint.
//! Loads config, arms the scheduler and serves the HTTP API plus `/metrics`.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON when `SYNC_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("model_status_sync=info,sync=info,warn"));

    let json = std::env::var("SYNC_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already have installed a subscriber; keep the first one.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = model_status_sync::app().await?;
    Ok(router.into())
}
