// src/store.rs
//! Durable key-addressed store for canonical records.
//!
//! Readers always observe the last fully committed state: every backend
//! applies one record upsert (or one [`ModelStore::commit`] batch) atomically.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::record::{CanonicalModelRecord, PricePoint};

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get(&self, model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError>;

    async fn upsert(&self, record: CanonicalModelRecord) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError>;

    async fn append_prices(&self, points: Vec<PricePoint>) -> Result<(), StoreError>;

    /// Oldest first.
    async fn pricing_history(&self, model_id: &str) -> Result<Vec<PricePoint>, StoreError>;

    /// Write a run's touched set. The default writes records one at a time and
    /// stops at the first failure; backends that can swap state in one step
    /// override it.
    async fn commit(
        &self,
        records: Vec<CanonicalModelRecord>,
        prices: Vec<PricePoint>,
    ) -> Result<(), StoreError> {
        for r in records {
            self.upsert(r).await?;
        }
        if !prices.is_empty() {
            self.append_prices(prices).await?;
        }
        Ok(())
    }
}

/// Price points kept per model; older points are dropped first.
pub const MAX_PRICE_POINTS_PER_MODEL: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    records: BTreeMap<String, CanonicalModelRecord>,
    #[serde(default)]
    pricing: Vec<PricePoint>,
}

impl StoreState {
    fn apply(&mut self, records: Vec<CanonicalModelRecord>, prices: Vec<PricePoint>) {
        for r in records {
            self.records.insert(r.model_id.clone(), r);
        }
        self.append_prices(prices);
    }

    fn append_prices(&mut self, prices: Vec<PricePoint>) {
        if prices.is_empty() {
            return;
        }
        self.pricing.extend(prices);

        let mut per_model: HashMap<&str, usize> = HashMap::new();
        for p in &self.pricing {
            *per_model.entry(p.model_id.as_str()).or_default() += 1;
        }
        let mut excess: HashMap<String, usize> = per_model
            .into_iter()
            .filter(|(_, n)| *n > MAX_PRICE_POINTS_PER_MODEL)
            .map(|(id, n)| (id.to_string(), n - MAX_PRICE_POINTS_PER_MODEL))
            .collect();
        if excess.is_empty() {
            return;
        }
        // pricing is oldest first, so the first points seen are the ones to drop
        self.pricing.retain(|p| match excess.get_mut(&p.model_id) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        });
    }

    fn history_of(&self, model_id: &str) -> Vec<PricePoint> {
        self.pricing
            .iter()
            .filter(|p| p.model_id == model_id)
            .cloned()
            .collect()
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<CanonicalModelRecord>) -> Self {
        let mut state = StoreState::default();
        state.apply(records, Vec::new());
        Self {
            inner: RwLock::new(state),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn get(&self, model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError> {
        Ok(self.read().records.get(model_id).cloned())
    }

    async fn upsert(&self, record: CanonicalModelRecord) -> Result<(), StoreError> {
        self.write().apply(vec![record], Vec::new());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError> {
        Ok(self.read().records.values().cloned().collect())
    }

    async fn append_prices(&self, points: Vec<PricePoint>) -> Result<(), StoreError> {
        self.write().append_prices(points);
        Ok(())
    }

    async fn pricing_history(&self, model_id: &str) -> Result<Vec<PricePoint>, StoreError> {
        Ok(self.read().history_of(model_id))
    }

    async fn commit(
        &self,
        records: Vec<CanonicalModelRecord>,
        prices: Vec<PricePoint>,
    ) -> Result<(), StoreError> {
        self.write().apply(records, prices);
        Ok(())
    }
}

/// Single JSON document on disk, replaced atomically (write tmp + rename).
///
/// Reads are served from the last committed state; writers are serialized.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    writer: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or create on first commit) the store file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => StoreState::default(),
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(StoreError::io(format!("reading {}", path.display()), e)),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    fn snapshot(&self) -> StoreState {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn persist(&self, next: &StoreState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(format!("creating {}", dir.display()), e))?;
        }
        let json = serde_json::to_vec_pretty(next)
            .map_err(|e| StoreError::Corrupt(format!("serializing store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(format!("writing {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(format!("renaming to {}", self.path.display()), e))?;
        Ok(())
    }

    async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreState) + Send,
    {
        let _w = self.writer.lock().await;
        let mut next = self.snapshot();
        f(&mut next);
        self.persist(&next).await?;
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = next;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for JsonFileStore {
    async fn get(&self, model_id: &str) -> Result<Option<CanonicalModelRecord>, StoreError> {
        let g = self.state.read().unwrap_or_else(|p| p.into_inner());
        Ok(g.records.get(model_id).cloned())
    }

    async fn upsert(&self, record: CanonicalModelRecord) -> Result<(), StoreError> {
        self.mutate(|s| s.apply(vec![record], Vec::new())).await
    }

    async fn list(&self) -> Result<Vec<CanonicalModelRecord>, StoreError> {
        Ok(self.snapshot().records.into_values().collect())
    }

    async fn append_prices(&self, points: Vec<PricePoint>) -> Result<(), StoreError> {
        self.mutate(|s| s.append_prices(points)).await
    }

    async fn pricing_history(&self, model_id: &str) -> Result<Vec<PricePoint>, StoreError> {
        let g = self.state.read().unwrap_or_else(|p| p.into_inner());
        Ok(g.history_of(model_id))
    }

    async fn commit(
        &self,
        records: Vec<CanonicalModelRecord>,
        prices: Vec<PricePoint>,
    ) -> Result<(), StoreError> {
        self.mutate(|s| s.apply(records, prices)).await
    }
}
