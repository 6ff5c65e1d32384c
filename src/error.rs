// src/error.rs
//! Error taxonomy for a synchronization pass.
//!
//! Only [`SyncError::Persistence`] is fatal to a run. Provider and timeout
//! errors are isolated to one adapter and end up in `SyncRun.errors`;
//! validation errors skip a single observation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a canonical-store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store io error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors that can occur while running a synchronization pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport, HTTP status or decoding failure of one adapter.
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// Adapter did not settle within its own timeout.
    #[error("provider {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// Malformed observation; the record is skipped.
    #[error("invalid observation {model_key}@{provider}: {reason}")]
    Validation {
        provider: String,
        model_key: String,
        reason: String,
    },

    /// Canonical store unreachable or a write failed; aborts the run.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The single-flight token could not be read or written.
    #[error("sync lock error: {0}")]
    Lock(String),
}

impl SyncError {
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Which component the error is attributed to in `SyncRun.errors`.
    pub fn source_name(&self) -> &str {
        match self {
            SyncError::Provider { provider, .. }
            | SyncError::Timeout { provider, .. }
            | SyncError::Validation { provider, .. } => provider,
            SyncError::Persistence(_) => "store",
            SyncError::Lock(_) => "lock",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }

    pub fn to_entry(&self) -> RunError {
        RunError {
            provider: self.source_name().to_string(),
            message: self.to_string(),
        }
    }
}

/// One entry of `SyncRun.errors`, in the order it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub provider: String,
    pub message: String,
}
