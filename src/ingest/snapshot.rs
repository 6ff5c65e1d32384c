// src/ingest/snapshot.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::ProviderObservation;

/// Observations accepted by the last successful pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSnapshot {
    pub taken_at: DateTime<Utc>,
    pub observations: Vec<ProviderObservation>,
}

#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Store the snapshot atomically (as best-effort).
    async fn store(&self, snapshot: &ObservationSnapshot) -> Result<()>;
}

/// Writes `<dir>/latest.json`, replacing the previous snapshot.
pub struct FileSnapshotSink {
    dir: PathBuf,
}

impl FileSnapshotSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("latest.json")
    }
}

#[async_trait::async_trait]
impl SnapshotSink for FileSnapshotSink {
    async fn store(&self, snapshot: &ObservationSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.latest_path();
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot).context("serializing snapshot")?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming to {}", path.display()))?;
        Ok(())
    }
}

/// Keeps every snapshot in memory; handy for tests and dry runs.
#[derive(Default)]
pub struct MemorySnapshotSink {
    pub calls: std::sync::Mutex<Vec<ObservationSnapshot>>,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotSink for MemorySnapshotSink {
    async fn store(&self, snapshot: &ObservationSnapshot) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(snapshot.clone());
        Ok(())
    }
}
