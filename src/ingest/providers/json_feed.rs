// src/ingest/providers/json_feed.rs
//! Adapter for sources that publish model observations as JSON.
//!
//! Accepted body shapes: a bare array, `{"models": [...]}` or `{"data": [...]}`.
//! `providerId` and `fetchedAt` may be omitted per item; they default to the
//! adapter id and the fetch time.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::config::ProviderCfg;
use crate::ingest::types::{
    Fetched, MalformedItem, ObservationMetrics, ProviderAdapter, ProviderObservation,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireObservation {
    model_key: String,
    #[serde(default)]
    provider_id: Option<String>,
    #[serde(default)]
    metrics: ObservationMetrics,
    #[serde(default)]
    availability_pct: Option<f64>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
}

/// Pull the item list out of a bare array, `{"models": [...]}` or
/// `{"data": [...]}`. Anything else is not a feed.
fn feed_items(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("models").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        api_key: Option<String>,
    },
}

pub struct JsonFeedProvider {
    id: String,
    data_source: String,
    mode: Mode,
}

impl JsonFeedProvider {
    /// Serve a fixed JSON document; used in tests and local runs.
    pub fn from_fixture(id: &str, data_source: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            data_source: data_source.to_string(),
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_url(id: &str, data_source: &str, url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("model-status-sync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            id: id.to_string(),
            data_source: data_source.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
                api_key,
            },
        })
    }

    /// API key is read from `api_key_env` when set; a missing variable means
    /// an anonymous request, not an error.
    pub fn from_cfg(cfg: &ProviderCfg) -> Result<Self> {
        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());
        let data_source = cfg.data_source.as_deref().unwrap_or(&cfg.id);
        Self::from_url(&cfg.id, data_source, &cfg.url, api_key)
    }

    /// A body that is not a feed fails the fetch. A single unreadable item
    /// only lands in `malformed`.
    fn parse_body(&self, body: &str, now: DateTime<Utc>) -> Result<Fetched> {
        let parsed: Value = serde_json::from_str(body.trim())
            .with_context(|| format!("parsing {} feed json", self.id))?;
        let Some(items) = feed_items(parsed) else {
            bail!("{} feed json has no model list", self.id);
        };

        let mut out = Fetched::default();
        for item in items {
            let model_key = item
                .get("modelKey")
                .and_then(Value::as_str)
                .map(str::to_string);
            match serde_json::from_value::<WireObservation>(item) {
                Ok(w) => out.observations.push(ProviderObservation {
                    model_key: w.model_key,
                    provider_id: w.provider_id.unwrap_or_else(|| self.id.clone()),
                    metrics: w.metrics,
                    availability_pct: w.availability_pct,
                    is_active: w.is_active,
                    fetched_at: w.fetched_at.unwrap_or(now),
                }),
                Err(e) => out.malformed.push(MalformedItem {
                    model_key,
                    reason: format!("malformed item: {e}"),
                }),
            }
        }
        counter!("sync_observations_total", "provider" => self.id.clone())
            .increment(out.observations.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl ProviderAdapter for JsonFeedProvider {
    async fn fetch(&self) -> Result<Fetched> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(s) => self.parse_body(s, now),
            Mode::Http {
                url,
                client,
                api_key,
            } => {
                let mut req = client.get(url).header("accept", "application/json");
                if let Some(key) = api_key {
                    req = req.bearer_auth(key);
                }
                let resp = req
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.id))?;
                let status = resp.status();
                if !status.is_success() {
                    bail!("HTTP {status}");
                }
                let body = resp
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.id))?;
                self.parse_body(&body, now)
            }
        }
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn data_source(&self) -> &str {
        &self.data_source
    }
}
