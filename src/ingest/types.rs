// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional metric fields. `None` means "no data this pass", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_price: Option<f64>,
}

/// One provider's snapshot for one model, for one fetch pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderObservation {
    pub model_key: String,
    pub provider_id: String,
    #[serde(default)]
    pub metrics: ObservationMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    pub fetched_at: DateTime<Utc>,
}

impl ProviderObservation {
    pub fn new(provider_id: &str, model_key: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            model_key: model_key.to_string(),
            provider_id: provider_id.to_string(),
            metrics: ObservationMetrics::default(),
            availability_pct: None,
            is_active: None,
            fetched_at,
        }
    }
}

/// A feed item that could not be read as an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedItem {
    /// `modelKey` when the item carried one as a string.
    pub model_key: Option<String>,
    pub reason: String,
}

/// Result of one adapter fetch. Malformed items are reported next to the
/// readable ones instead of failing the whole fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub observations: Vec<ProviderObservation>,
    pub malformed: Vec<MalformedItem>,
}

impl From<Vec<ProviderObservation>> for Fetched {
    fn from(observations: Vec<ProviderObservation>) -> Self {
        Self {
            observations,
            malformed: Vec::new(),
        }
    }
}

/// One external source. Owns its own transport; the engine adds the timeout.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Fetched>;

    /// Provider id used in `SyncRun.errors` and to check observations.
    fn name(&self) -> &str;

    /// Label copied into `CanonicalModelRecord.dataSource`.
    fn data_source(&self) -> &str {
        self.name()
    }
}
