// src/engine.rs
//! Merge/upsert of one synchronization pass.
//!
//! Fetch all adapters concurrently, validate, merge each observation into its
//! canonical record with no-clobber semantics, re-derive status for the whole
//! touched set, then commit once. A failed adapter only loses its own models
//! for this pass; their stored values stay as they were.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::clock::{SharedClock, SystemClock};
use crate::error::SyncError;
use crate::history::{quality_breakdown, quality_score, QualityBreakdown, SyncRun};
use crate::ingest::config::{DEFAULT_ERROR_PENALTY, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::ingest::snapshot::{ObservationSnapshot, SnapshotSink};
use crate::ingest::types::ProviderObservation;
use crate::ingest::{self, DynAdapter};
use crate::record::{model_id, CanonicalModelRecord, PricePoint};
use crate::status;
use crate::store::ModelStore;

/// What a single observation changed on its record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub any: bool,
    pub pricing: bool,
}

/// Overwrite only when the incoming value is present and different.
fn set_if_present<T: PartialEq + Copy>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(v) if *slot != Some(v) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

/// No-clobber merge of one observation. Absent fields never clear a value.
/// `status` and `lastVerified` are not touched here.
pub fn merge_observation(
    record: &mut CanonicalModelRecord,
    obs: &ProviderObservation,
    data_source: &str,
) -> FieldChanges {
    let m = &obs.metrics;
    let input = set_if_present(&mut record.input_price, m.input_price);
    let output = set_if_present(&mut record.output_price, m.output_price);
    let mut any = input | output;
    any |= set_if_present(&mut record.intelligence_score, m.intelligence_score);
    any |= set_if_present(&mut record.output_speed, m.output_speed);
    any |= set_if_present(
        &mut record.availability_pct,
        obs.availability_pct.map(status::clamp_pct),
    );
    if let Some(active) = obs.is_active {
        if record.is_active != active {
            record.is_active = active;
            any = true;
        }
    }
    if !data_source.is_empty() && record.data_source != data_source {
        record.data_source = data_source.to_string();
        any = true;
    }
    FieldChanges {
        any,
        pricing: input | output,
    }
}

#[derive(Debug)]
struct Touched {
    record: CanonicalModelRecord,
    changed: bool,
    pricing_changed: bool,
}

/// Outcome of one pass, before it is written into a [`SyncRun`].
#[derive(Debug, Default)]
pub struct MergeReport {
    pub models_count: usize,
    pub models_updated: usize,
    pub pricing_updated: usize,
    pub invalid_records: usize,
    pub complete_models: usize,
    pub quality: QualityBreakdown,
    /// Non-fatal adapter failures, in configuration order.
    pub errors: Vec<SyncError>,
    /// Set when the store failed; nothing from this pass was committed.
    pub fatal: Option<SyncError>,
    pub all_providers_failed: bool,
}

impl MergeReport {
    pub fn success(&self) -> bool {
        self.fatal.is_none() && !self.all_providers_failed
    }

    /// Copy counts, errors and quality into `run`.
    pub fn record_into(&self, run: &mut SyncRun, error_penalty: f64) {
        run.success = self.success();
        run.models_count = self.models_count;
        run.models_updated = self.models_updated;
        run.pricing_updated = self.pricing_updated;
        run.invalid_records = self.invalid_records;
        run.quality = self.quality;
        run.errors = self.errors.iter().map(SyncError::to_entry).collect();
        if let Some(f) = &self.fatal {
            run.errors.push(f.to_entry());
        }
        run.data_quality_score = quality_score(
            self.complete_models,
            self.models_count,
            run.errors.len(),
            error_penalty,
        );
    }
}

pub struct SyncEngine {
    adapters: Vec<DynAdapter>,
    store: Arc<dyn ModelStore>,
    clock: SharedClock,
    fetch_timeout: Duration,
    error_penalty: f64,
    snapshot: Option<Arc<dyn SnapshotSink>>,
}

impl SyncEngine {
    pub fn new(adapters: Vec<DynAdapter>, store: Arc<dyn ModelStore>) -> Self {
        Self {
            adapters,
            store,
            clock: Arc::new(SystemClock),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            error_penalty: DEFAULT_ERROR_PENALTY,
            snapshot: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_error_penalty(mut self, penalty: f64) -> Self {
        self.error_penalty = penalty;
        self
    }

    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.snapshot = Some(sink);
        self
    }

    pub fn error_penalty(&self) -> f64 {
        self.error_penalty
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Run one full pass: fetch, validate, merge, normalize, commit.
    pub async fn run(&self) -> MergeReport {
        let fetched = ingest::fetch_all(&self.adapters, self.fetch_timeout).await;
        let mut report = MergeReport {
            all_providers_failed: fetched.all_failed(),
            errors: fetched.errors,
            ..MergeReport::default()
        };

        let mut accepted: Vec<ProviderObservation> = Vec::new();
        let mut touched: BTreeMap<String, Touched> = BTreeMap::new();
        let now = self.clock.now();

        for batch in fetched.batches {
            let (batch, rejected) = ingest::partition_valid(batch);
            report.invalid_records += rejected.len();
            for obs in batch.observations {
                match self.merge_one(&mut touched, &obs, &batch.data_source, now).await {
                    Ok(()) => accepted.push(obs),
                    Err(e) if !e.is_fatal() => {
                        tracing::warn!(target: "sync", error = %e, "observation skipped");
                        counter!("sync_invalid_observations_total").increment(1);
                        report.invalid_records += 1;
                    }
                    Err(e) => {
                        tracing::error!(target: "sync", error = %e, "store read failed, aborting merge");
                        report.fatal = Some(e);
                        return report;
                    }
                }
            }
        }

        for t in touched.values_mut() {
            if status::normalize(&mut t.record) {
                t.changed = true;
            }
            t.record.last_verified = now;
        }

        let mut prices = Vec::new();
        let mut records = Vec::with_capacity(touched.len());
        for t in touched.into_values() {
            if t.changed {
                report.models_updated += 1;
                tracing::debug!(target: "sync", model_id = %t.record.model_id, status = t.record.status.as_str(), "record changed");
            }
            if t.pricing_changed {
                report.pricing_updated += 1;
                prices.push(PricePoint {
                    model_id: t.record.model_id.clone(),
                    input_price: t.record.input_price,
                    output_price: t.record.output_price,
                    effective_from: now,
                    data_source: t.record.data_source.clone(),
                });
            }
            records.push(t.record);
        }

        report.models_count = records.len();
        report.complete_models = records.iter().filter(|r| r.has_core_metrics()).count();
        report.quality = quality_breakdown(&records);

        if let Err(e) = self.store.commit(records, prices).await {
            let e = SyncError::from(e);
            tracing::error!(target: "sync", error = %e, "commit failed");
            report.fatal = Some(e);
            report.models_updated = 0;
            report.pricing_updated = 0;
            return report;
        }
        counter!("sync_models_updated_total").increment(report.models_updated as u64);

        if let Some(sink) = &self.snapshot {
            let snap = ObservationSnapshot {
                taken_at: now,
                observations: accepted,
            };
            if let Err(e) = sink.store(&snap).await {
                tracing::warn!(target: "sync", error = %e, "snapshot write failed");
            }
        }

        report
    }

    async fn merge_one(
        &self,
        touched: &mut BTreeMap<String, Touched>,
        obs: &ProviderObservation,
        data_source: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let id = model_id(&obs.provider_id, &obs.model_key);
        if let Some(t) = touched.get(&id) {
            check_same_model(&t.record, obs)?;
        } else {
            let entry = match self.store.get(&id).await? {
                Some(record) => {
                    check_same_model(&record, obs)?;
                    Touched {
                        record,
                        changed: false,
                        pricing_changed: false,
                    }
                }
                None => Touched {
                    record: CanonicalModelRecord::new(
                        &obs.provider_id,
                        &obs.model_key,
                        data_source,
                        now,
                    ),
                    changed: true,
                    pricing_changed: false,
                },
            };
            touched.insert(id.clone(), entry);
        }
        if let Some(t) = touched.get_mut(&id) {
            let c = merge_observation(&mut t.record, obs, data_source);
            t.changed |= c.any;
            t.pricing_changed |= c.pricing;
        }
        Ok(())
    }
}

/// Two distinct keys can slug to the same id (`gpt-4.0`, `gpt-4-0`). The
/// record keeps the key that created it; any other key is rejected.
fn check_same_model(record: &CanonicalModelRecord, obs: &ProviderObservation) -> Result<(), SyncError> {
    if record.model_key.trim().eq_ignore_ascii_case(obs.model_key.trim()) {
        return Ok(());
    }
    Err(SyncError::Validation {
        provider: obs.provider_id.clone(),
        model_key: obs.model_key.clone(),
        reason: format!(
            "model id collision with {:?} on {}",
            record.model_key, record.model_id
        ),
    })
}
