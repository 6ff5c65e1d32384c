// tests/common/mod.rs
//
// Shared adapters and stores for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use model_status_sync::error::StoreError;
use model_status_sync::ingest::DynAdapter;
use model_status_sync::lock::LocalSyncLock;
use model_status_sync::record::{CanonicalModelRecord, PricePoint};
use model_status_sync::store::{MemoryStore, ModelStore};
use model_status_sync::{
    Fetched, ProviderAdapter, ProviderObservation, SchedulerCfg, SyncEngine, SyncScheduler,
};

/// Observation builder: `obs("openai", "gpt-4o").avail(99.0).prices(2.5, 10.0)`.
pub fn obs(provider: &str, key: &str) -> ProviderObservation {
    ProviderObservation::new(provider, key, Utc::now())
}

pub trait ObsExt {
    fn avail(self, pct: f64) -> Self;
    fn active(self, on: bool) -> Self;
    fn prices(self, input: f64, output: f64) -> Self;
    fn intelligence(self, v: f64) -> Self;
    fn speed(self, v: f64) -> Self;
    fn complete(self) -> Self;
}

impl ObsExt for ProviderObservation {
    fn avail(mut self, pct: f64) -> Self {
        self.availability_pct = Some(pct);
        self
    }
    fn active(mut self, on: bool) -> Self {
        self.is_active = Some(on);
        self
    }
    fn prices(mut self, input: f64, output: f64) -> Self {
        self.metrics.input_price = Some(input);
        self.metrics.output_price = Some(output);
        self
    }
    fn intelligence(mut self, v: f64) -> Self {
        self.metrics.intelligence_score = Some(v);
        self
    }
    fn speed(mut self, v: f64) -> Self {
        self.metrics.output_speed = Some(v);
        self
    }
    fn complete(self) -> Self {
        self.intelligence(70.0).speed(100.0).prices(2.5, 10.0)
    }
}

/// Returns the same observations on every fetch.
pub struct StaticAdapter {
    pub id: String,
    pub data_source: Option<String>,
    pub observations: Vec<ProviderObservation>,
}

impl StaticAdapter {
    pub fn new(id: &str, observations: Vec<ProviderObservation>) -> Self {
        Self {
            id: id.to_string(),
            data_source: None,
            observations,
        }
    }

    pub fn with_source(mut self, data_source: &str) -> Self {
        self.data_source = Some(data_source.to_string());
        self
    }

    pub fn shared(id: &str, observations: Vec<ProviderObservation>) -> DynAdapter {
        Arc::new(Self::new(id, observations))
    }
}

#[async_trait]
impl ProviderAdapter for StaticAdapter {
    async fn fetch(&self) -> anyhow::Result<Fetched> {
        Ok(self.observations.clone().into())
    }
    fn name(&self) -> &str {
        &self.id
    }
    fn data_source(&self) -> &str {
        self.data_source.as_deref().unwrap_or(&self.id)
    }
}

pub struct FailingAdapter(pub String);

#[async_trait]
impl ProviderAdapter for FailingAdapter {
    async fn fetch(&self) -> anyhow::Result<Fetched> {
        anyhow::bail!("HTTP 503 Service Unavailable")
    }
    fn name(&self) -> &str {
        &self.0
    }
}

/// Sleeps far longer than any test timeout.
pub struct SlowAdapter(pub String);

#[async_trait]
impl ProviderAdapter for SlowAdapter {
    async fn fetch(&self) -> anyhow::Result<Fetched> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Fetched::default())
    }
    fn name(&self) -> &str {
        &self.0
    }
}

/// Blocks inside `fetch` until the test opens the gate.
pub struct GatedAdapter {
    pub id: String,
    pub gate: Arc<Notify>,
    pub observations: Vec<ProviderObservation>,
}

#[async_trait]
impl ProviderAdapter for GatedAdapter {
    async fn fetch(&self) -> anyhow::Result<Fetched> {
        self.gate.notified().await;
        Ok(self.observations.clone().into())
    }
    fn name(&self) -> &str {
        &self.id
    }
}

/// Reads succeed from the inner store; every write fails.
pub struct ReadOnlyStore(pub MemoryStore);

#[async_trait]
impl ModelStore for ReadOnlyStore {
    async fn get(&self, model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError> {
        self.0.get(model_id).await
    }
    async fn upsert(&self, _record: CanonicalModelRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError> {
        self.0.list().await
    }
    async fn append_prices(&self, _points: Vec<PricePoint>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn pricing_history(&self, model_id: &str) -> Result<Vec<PricePoint>, StoreError> {
        self.0.pricing_history(model_id).await
    }
}

/// Every read fails; nothing can be written either.
pub struct UnreachableStore;

#[async_trait]
impl ModelStore for UnreachableStore {
    async fn get(&self, _model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn upsert(&self, _record: CanonicalModelRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn append_prices(&self, _points: Vec<PricePoint>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn pricing_history(&self, _model_id: &str) -> Result<Vec<PricePoint>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Panics on the first read, taking the whole engine pass down with it.
pub struct PanickingStore;

#[async_trait]
impl ModelStore for PanickingStore {
    async fn get(&self, model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError> {
        panic!("store driver crashed reading {model_id}")
    }
    async fn upsert(&self, _record: CanonicalModelRecord) -> Result<(), StoreError> {
        Ok(())
    }
    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError> {
        Ok(Vec::new())
    }
    async fn append_prices(&self, _points: Vec<PricePoint>) -> Result<(), StoreError> {
        Ok(())
    }
    async fn pricing_history(&self, _model_id: &str) -> Result<Vec<PricePoint>, StoreError> {
        Ok(Vec::new())
    }
}

pub fn scheduler_with(engine: SyncEngine, interval: Duration, sync_on_start: bool) -> SyncScheduler {
    SyncScheduler::new(
        Arc::new(engine),
        Arc::new(LocalSyncLock::new()),
        SchedulerCfg {
            interval,
            sync_on_start,
            history_capacity: 20,
        },
    )
}

/// Poll `cond` every 10ms for up to ~2s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
