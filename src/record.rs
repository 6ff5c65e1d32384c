// src/record.rs
//! Canonical per-model-per-provider record, as read by downstream consumers.
//!
//! Readers must tolerate `status = unknown` and any metric being absent.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Operational status. Never set directly; see [`crate::status::derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Operational,
    Degraded,
    Outage,
    #[default]
    Unknown,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Operational => "operational",
            ModelStatus::Degraded => "degraded",
            ModelStatus::Outage => "outage",
            ModelStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalModelRecord {
    pub model_id: String,
    pub provider_id: String,
    pub model_key: String,
    pub is_active: bool,
    pub status: ModelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_price: Option<f64>,
    pub data_source: String,
    pub last_verified: DateTime<Utc>,
}

impl CanonicalModelRecord {
    /// Fresh active record with no metrics yet.
    pub fn new(provider_id: &str, model_key: &str, data_source: &str, now: DateTime<Utc>) -> Self {
        Self {
            model_id: model_id(provider_id, model_key),
            provider_id: provider_id.to_string(),
            model_key: model_key.to_string(),
            is_active: true,
            status: ModelStatus::Unknown,
            availability_pct: None,
            intelligence_score: None,
            output_speed: None,
            input_price: None,
            output_price: None,
            data_source: data_source.to_string(),
            last_verified: now,
        }
    }

    /// All core metrics (intelligence, speed, both prices) are present.
    pub fn has_core_metrics(&self) -> bool {
        self.intelligence_score.is_some()
            && self.output_speed.is_some()
            && self.input_price.is_some()
            && self.output_price.is_some()
    }

    pub fn has_pricing(&self) -> bool {
        self.input_price.is_some() || self.output_price.is_some()
    }
}

/// Appended whenever a record's input or output price changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub model_id: String,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub effective_from: DateTime<Utc>,
    pub data_source: String,
}

static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));

/// Lowercase, collapse runs of non-alphanumerics to `-`, trim dashes.
pub fn slugify(s: &str) -> String {
    let lower = s.trim().to_ascii_lowercase();
    RE_NON_SLUG
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Canonical id addressing `(modelKey, providerId)`.
pub fn model_id(provider_id: &str, model_key: &str) -> String {
    format!("{}-{}", slugify(provider_id), slugify(model_key))
}
