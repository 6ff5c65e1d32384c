// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "SYNC_CONFIG_PATH";
pub const ENV_ENABLED: &str = "SYNC_ENABLED";
pub const ENV_INTERVAL_SECS: &str = "SYNC_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "SYNC_FETCH_TIMEOUT_SECS";
pub const ENV_HISTORY_CAPACITY: &str = "SYNC_HISTORY_CAPACITY";

pub const DEFAULT_INTERVAL_SECS: u64 = 30 * 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
pub const DEFAULT_ERROR_PENALTY: f64 = 5.0;
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 5 * 60;

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}
fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}
fn default_error_penalty() -> f64 {
    DEFAULT_ERROR_PENALTY
}

/// One HTTP/JSON source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCfg {
    pub id: String,
    pub url: String,
    /// Defaults to `id`.
    #[serde(default)]
    pub data_source: Option<String>,
    /// Name of the env var holding a bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// First timer tick fires immediately after `start()`.
    #[serde(default = "default_true")]
    pub sync_on_start: bool,
    /// Quality points subtracted per run error.
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Enables the file-backed lock shared between processes.
    #[serde(default)]
    pub lock_path: Option<PathBuf>,
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub providers: Vec<ProviderCfg>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sync_on_start: true,
            error_penalty: DEFAULT_ERROR_PENALTY,
            store_path: None,
            lock_path: None,
            snapshot_dir: None,
            providers: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Replace unusable values with defaults instead of failing startup.
    /// Durations above their maximum are clamped to it.
    pub fn sanitized(mut self) -> Self {
        if self.interval_secs == 0 {
            self.interval_secs = DEFAULT_INTERVAL_SECS;
        }
        if self.interval_secs > MAX_INTERVAL_SECS {
            tracing::warn!(target: "sync", interval_secs = self.interval_secs, max = MAX_INTERVAL_SECS, "interval clamped");
            self.interval_secs = MAX_INTERVAL_SECS;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = DEFAULT_FETCH_TIMEOUT_SECS;
        }
        if self.fetch_timeout_secs > MAX_FETCH_TIMEOUT_SECS {
            tracing::warn!(target: "sync", fetch_timeout_secs = self.fetch_timeout_secs, max = MAX_FETCH_TIMEOUT_SECS, "fetch timeout clamped");
            self.fetch_timeout_secs = MAX_FETCH_TIMEOUT_SECS;
        }
        if self.history_capacity == 0 {
            self.history_capacity = DEFAULT_HISTORY_CAPACITY;
        }
        if !self.error_penalty.is_finite() || self.error_penalty < 0.0 {
            self.error_penalty = DEFAULT_ERROR_PENALTY;
        }
        self.providers.retain(|p| {
            let keep = !p.id.trim().is_empty() && !p.url.trim().is_empty();
            if !keep {
                tracing::warn!(target: "sync", provider = %p.id, "provider without id/url ignored");
            }
            keep
        });
        self
    }

    /// Overlay `SYNC_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_parse::<String>(ENV_ENABLED) {
            self.enabled = !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(v) = env_parse::<u64>(ENV_INTERVAL_SECS) {
            self.interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_FETCH_TIMEOUT_SECS) {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_HISTORY_CAPACITY) {
            self.history_capacity = v;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<SyncConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sync config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load config using env var + fallbacks, then env overrides:
/// 1) $SYNC_CONFIG_PATH
/// 2) config/sync.toml
/// 3) config/sync.json
/// 4) built-in defaults
pub fn load_default() -> Result<SyncConfig> {
    let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_from(&pb)?
    } else {
        let toml_p = PathBuf::from("config/sync.toml");
        let json_p = PathBuf::from("config/sync.json");
        if toml_p.exists() {
            load_from(&toml_p)?
        } else if json_p.exists() {
            load_from(&json_p)?
        } else {
            SyncConfig::default()
        }
    };
    Ok(base.apply_env().sanitized())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<SyncConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing sync config json");
    }
    match toml::from_str::<SyncConfig>(s) {
        Ok(c) => Ok(c),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!(toml_err))
            .context("parsing sync config"),
    }
}
