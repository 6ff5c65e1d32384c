// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod snapshot;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::error::SyncError;
use crate::ingest::types::{MalformedItem, ProviderAdapter, ProviderObservation};
use crate::record::slugify;

pub type DynAdapter = Arc<dyn ProviderAdapter>;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Finished synchronization runs.");
        describe_counter!(
            "sync_rejected_total",
            "Triggers rejected because a run was already in progress."
        );
        describe_counter!(
            "sync_provider_errors_total",
            "Adapter fetch failures and timeouts."
        );
        describe_counter!(
            "sync_invalid_observations_total",
            "Observations skipped by validation."
        );
        describe_counter!(
            "sync_models_updated_total",
            "Canonical records with at least one changed field."
        );
        describe_counter!(
            "sync_observations_total",
            "Observations parsed from provider feeds."
        );
        describe_histogram!("sync_fetch_ms", "Adapter fetch time in milliseconds.");
        describe_histogram!("sync_duration_ms", "Whole run duration in milliseconds.");
        describe_gauge!("sync_data_quality", "Data quality score of the last run.");
        describe_gauge!("sync_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Observations from one adapter that fetched successfully.
#[derive(Debug, Clone)]
pub struct ProviderBatch {
    pub provider: String,
    pub data_source: String,
    pub observations: Vec<ProviderObservation>,
    /// Items the adapter could not read; counted as invalid records.
    pub malformed: Vec<MalformedItem>,
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub batches: Vec<ProviderBatch>,
    /// Failed or timed-out adapters, in configuration order.
    pub errors: Vec<SyncError>,
}

impl FetchOutcome {
    pub fn all_failed(&self) -> bool {
        self.batches.is_empty() && !self.errors.is_empty()
    }
}

/// Fetch every adapter concurrently, each under its own timeout, and wait for
/// all of them to settle. A failure, timeout or panic in one adapter never
/// affects the others.
pub async fn fetch_all(adapters: &[DynAdapter], timeout: Duration) -> FetchOutcome {
    ensure_metrics_described();

    let handles: Vec<_> = adapters
        .iter()
        .map(|a| {
            let adapter = Arc::clone(a);
            let name = adapter.name().to_string();
            let data_source = adapter.data_source().to_string();
            let handle = tokio::spawn(async move {
                let t0 = Instant::now();
                let res = tokio::time::timeout(timeout, adapter.fetch()).await;
                histogram!("sync_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                res
            });
            (name, data_source, handle)
        })
        .collect();

    let mut out = FetchOutcome::default();
    for (name, data_source, handle) in handles {
        let err = match handle.await {
            Ok(Ok(Ok(fetched))) => {
                tracing::debug!(
                    target: "sync",
                    provider = %name,
                    count = fetched.observations.len(),
                    malformed = fetched.malformed.len(),
                    "provider fetched"
                );
                out.batches.push(ProviderBatch {
                    provider: name,
                    data_source,
                    observations: fetched.observations,
                    malformed: fetched.malformed,
                });
                continue;
            }
            Ok(Ok(Err(e))) => SyncError::provider(&name, format!("{e:#}")),
            Ok(Err(_elapsed)) => SyncError::Timeout {
                provider: name.clone(),
                secs: timeout.as_secs(),
            },
            Err(join_err) => SyncError::provider(&name, format!("adapter task failed: {join_err}")),
        };
        tracing::warn!(target: "sync", provider = %name, error = %err, "provider error");
        counter!("sync_provider_errors_total", "provider" => name).increment(1);
        out.errors.push(err);
    }
    out
}

/// Check one observation against the adapter contract.
pub fn validate(provider: &str, obs: &ProviderObservation) -> Result<(), SyncError> {
    let invalid = |reason: String| SyncError::Validation {
        provider: provider.to_string(),
        model_key: obs.model_key.clone(),
        reason,
    };

    if slugify(&obs.model_key).is_empty() {
        return Err(invalid("empty model key".into()));
    }
    if slugify(&obs.provider_id) != slugify(provider) {
        return Err(invalid(format!(
            "provider mismatch: observation says {:?}",
            obs.provider_id
        )));
    }
    if let Some(a) = obs.availability_pct {
        if !a.is_finite() || !(0.0..=100.0).contains(&a) {
            return Err(invalid(format!("availability {a} outside [0, 100]")));
        }
    }
    let m = &obs.metrics;
    for (field, value) in [
        ("intelligenceScore", m.intelligence_score),
        ("outputSpeed", m.output_speed),
        ("inputPrice", m.input_price),
        ("outputPrice", m.output_price),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(format!("{field} {v} is not a finite non-negative number")));
            }
        }
    }
    Ok(())
}

/// Split a batch into valid observations and the validation errors for the
/// rest. Malformed feed items come first in the rejected list.
pub fn partition_valid(batch: ProviderBatch) -> (ProviderBatch, Vec<SyncError>) {
    let ProviderBatch {
        provider,
        data_source,
        observations,
        malformed,
    } = batch;
    let mut kept = Vec::with_capacity(observations.len());
    let mut rejected: Vec<SyncError> = malformed
        .into_iter()
        .map(|m| SyncError::Validation {
            provider: provider.clone(),
            model_key: m.model_key.unwrap_or_else(|| "<unknown>".into()),
            reason: m.reason,
        })
        .collect();
    for e in &rejected {
        tracing::warn!(target: "sync", error = %e, "feed item skipped");
    }
    for obs in observations {
        match validate(&provider, &obs) {
            Ok(()) => kept.push(obs),
            Err(e) => {
                tracing::warn!(target: "sync", error = %e, "observation skipped");
                rejected.push(e);
            }
        }
    }
    if !rejected.is_empty() {
        counter!("sync_invalid_observations_total").increment(rejected.len() as u64);
    }
    (
        ProviderBatch {
            provider,
            data_source,
            observations: kept,
            malformed: Vec::new(),
        },
        rejected,
    )
}
