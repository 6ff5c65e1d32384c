// src/bootstrap.rs
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::clock::SystemClock;
use crate::engine::SyncEngine;
use crate::ingest::config::SyncConfig;
use crate::ingest::providers::build_adapters;
use crate::ingest::scheduler::{SchedulerCfg, SyncScheduler};
use crate::ingest::snapshot::FileSnapshotSink;
use crate::ingest::DynAdapter;
use crate::lock::{FileSyncLock, LocalSyncLock, SharedLock};
use crate::store::{JsonFileStore, MemoryStore, ModelStore};

/// Everything the binary needs, built from one [`SyncConfig`].
pub struct SyncRuntime {
    pub cfg: SyncConfig,
    pub scheduler: SyncScheduler,
}

impl SyncRuntime {
    /// Build adapters from `cfg.providers`.
    pub async fn from_config(cfg: SyncConfig) -> anyhow::Result<Self> {
        let adapters = build_adapters(&cfg.providers)?;
        Self::with_adapters(cfg, adapters).await
    }

    pub async fn with_adapters(cfg: SyncConfig, adapters: Vec<DynAdapter>) -> anyhow::Result<Self> {
        let store: Arc<dyn ModelStore> = match &cfg.store_path {
            Some(p) => Arc::new(
                JsonFileStore::open(p)
                    .await
                    .with_context(|| format!("opening store {}", p.display()))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };

        let lock: SharedLock = match &cfg.lock_path {
            Some(p) => Arc::new(FileSyncLock::new(p)),
            None => Arc::new(LocalSyncLock::new()),
        };

        let mut engine = SyncEngine::new(adapters, store)
            .with_clock(Arc::new(SystemClock))
            .with_fetch_timeout(cfg.fetch_timeout())
            .with_error_penalty(cfg.error_penalty);
        if let Some(dir) = &cfg.snapshot_dir {
            engine = engine.with_snapshot_sink(Arc::new(FileSnapshotSink::new(dir)));
        }

        // Safe diagnostics: provider ids only, never keys
        info!(
            target: "sync",
            providers = ?engine.adapter_names(),
            interval_secs = cfg.interval_secs,
            fetch_timeout_secs = cfg.fetch_timeout_secs,
            history_capacity = cfg.history_capacity,
            file_store = cfg.store_path.is_some(),
            shared_lock = cfg.lock_path.is_some(),
            "sync runtime configured"
        );

        let scheduler = SyncScheduler::new(
            Arc::new(engine),
            lock,
            SchedulerCfg {
                interval: cfg.interval(),
                sync_on_start: cfg.sync_on_start,
                history_capacity: cfg.history_capacity,
            },
        );
        Ok(Self { cfg, scheduler })
    }

    /// Arm the timer unless disabled by config.
    pub fn start(&self) {
        if !self.cfg.enabled {
            tracing::warn!(target: "sync", "scheduled sync disabled via config");
            return;
        }
        self.scheduler.start();
    }
}
