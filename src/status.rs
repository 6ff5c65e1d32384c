// src/status.rs
//! Consistency rules: status is a pure function of `(isActive, availabilityPct)`.
//!
//! | isActive | availabilityPct | status      |
//! |----------|-----------------|-------------|
//! | false    | any             | unknown     |
//! | true     | absent          | operational |
//! | true     | 0               | outage      |
//! | true     | (0, 90)         | degraded    |
//! | true     | >= 90           | operational |
//!
//! Inactive records keep their availability value; only the status is cleared.

use crate::record::{CanonicalModelRecord, ModelStatus};

/// Availability at or above this is operational.
pub const OPERATIONAL_THRESHOLD_PCT: f64 = 90.0;

/// Total over all inputs. Out-of-range values are clamped to `[0, 100]`
/// first; NaN is treated as absent.
pub fn derive_status(is_active: bool, availability_pct: Option<f64>) -> ModelStatus {
    if !is_active {
        return ModelStatus::Unknown;
    }
    match availability_pct.filter(|v| !v.is_nan()).map(clamp_pct) {
        None => ModelStatus::Operational,
        Some(v) if v <= 0.0 => ModelStatus::Outage,
        Some(v) if v < OPERATIONAL_THRESHOLD_PCT => ModelStatus::Degraded,
        Some(_) => ModelStatus::Operational,
    }
}

pub fn clamp_pct(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

/// Re-derive `status` in place. Returns true when it changed.
pub fn normalize(record: &mut CanonicalModelRecord) -> bool {
    let next = derive_status(record.is_active, record.availability_pct);
    if record.status == next {
        return false;
    }
    tracing::debug!(
        target: "sync",
        model_id = %record.model_id,
        from = record.status.as_str(),
        to = next.as_str(),
        "status re-derived"
    );
    record.status = next;
    true
}
