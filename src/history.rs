//! history.rs: bounded in-memory log of finished sync runs plus the
//! data-quality score computed for each run.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunError;
use crate::record::CanonicalModelRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Scheduled,
    Manual,
}

impl TriggeredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggeredBy::Scheduled => "scheduled",
            TriggeredBy::Manual => "manual",
        }
    }
}

/// Percentages of the touched set carrying each metric group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityBreakdown {
    pub with_intelligence: u32,
    pub with_speed: u32,
    pub with_pricing: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub models_count: usize,
    pub models_updated: usize,
    pub pricing_updated: usize,
    pub invalid_records: usize,
    pub data_quality_score: f64,
    pub quality: QualityBreakdown,
    pub errors: Vec<RunError>,
    pub triggered_by: TriggeredBy,
    #[serde(rename = "duration_ms")]
    pub duration_ms: u64,
}

impl SyncRun {
    /// A run that has started but not finished.
    pub fn begin(triggered_by: TriggeredBy, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: None,
            success: false,
            models_count: 0,
            models_updated: 0,
            pricing_updated: 0,
            invalid_records: 0,
            data_quality_score: 0.0,
            quality: QualityBreakdown::default(),
            errors: Vec::new(),
            triggered_by,
            duration_ms: 0,
        }
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.finished_at = Some(now);
        self.duration_ms = now
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// `(complete ÷ models_count) × 100 − penalty × errors`, clamped to `[0, 100]`
/// and rounded to one decimal. Zero models scores zero.
pub fn quality_score(complete: usize, models_count: usize, errors: usize, penalty: f64) -> f64 {
    if models_count == 0 {
        return 0.0;
    }
    let base = complete as f64 / models_count as f64 * 100.0;
    let score = (base - penalty * errors as f64).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}

pub fn quality_breakdown(records: &[CanonicalModelRecord]) -> QualityBreakdown {
    let total = records.len();
    if total == 0 {
        return QualityBreakdown::default();
    }
    let pct = |n: usize| (n as f64 / total as f64 * 100.0).round() as u32;
    QualityBreakdown {
        with_intelligence: pct(records.iter().filter(|r| r.intelligence_score.is_some()).count()),
        with_speed: pct(records.iter().filter(|r| r.output_speed.is_some()).count()),
        with_pricing: pct(records.iter().filter(|r| r.has_pricing()).count()),
    }
}

/// Newest-first ring of the last `cap` runs.
#[derive(Debug)]
pub struct SyncHistory {
    inner: Mutex<VecDeque<SyncRun>>,
    cap: usize,
}

impl SyncHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, run: SyncRun) {
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push_front(run);
        v.truncate(self.cap);
    }

    pub fn latest(&self) -> Option<SyncRun> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.front().cloned()
    }

    /// Newest first.
    pub fn snapshot(&self) -> Vec<SyncRun> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn run_at(secs: i64) -> SyncRun {
        let t = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap() + Duration::seconds(secs);
        let mut r = SyncRun::begin(TriggeredBy::Scheduled, t);
        r.finish(t + Duration::milliseconds(250));
        r
    }

    #[test]
    fn keeps_last_k_newest_first() {
        let h = SyncHistory::with_capacity(20);
        let runs: Vec<_> = (0..25).map(run_at).collect();
        for r in &runs {
            h.push(r.clone());
        }
        let snap = h.snapshot();
        assert_eq!(snap.len(), 20);
        assert_eq!(snap[0].run_id, runs[24].run_id);
        assert_eq!(snap[19].run_id, runs[5].run_id);
        for old in &runs[..5] {
            assert!(snap.iter().all(|r| r.run_id != old.run_id));
        }
        assert!(snap.windows(2).all(|w| w[0].started_at > w[1].started_at));
        assert_eq!(h.latest().unwrap().run_id, runs[24].run_id);
    }

    #[test]
    fn finish_sets_duration() {
        let r = run_at(0);
        assert!(r.is_finished());
        assert_eq!(r.duration_ms, 250);
    }

    #[test]
    fn quality_score_applies_penalty_and_clamps() {
        assert_eq!(quality_score(8, 10, 0, 5.0), 80.0);
        assert_eq!(quality_score(8, 10, 1, 5.0), 75.0);
        assert_eq!(quality_score(1, 10, 5, 5.0), 0.0);
        assert_eq!(quality_score(0, 0, 0, 5.0), 0.0);
        assert_eq!(quality_score(2, 3, 0, 5.0), 66.7);
    }

    #[test]
    fn breakdown_counts_each_group() {
        let now = Utc::now();
        let mut a = CanonicalModelRecord::new("openai", "a", "t", now);
        a.intelligence_score = Some(70.0);
        a.input_price = Some(1.0);
        let b = CanonicalModelRecord::new("openai", "b", "t", now);
        let q = quality_breakdown(&[a, b]);
        assert_eq!(q.with_intelligence, 50);
        assert_eq!(q.with_speed, 0);
        assert_eq!(q.with_pricing, 50);
    }

    #[test]
    fn run_serializes_with_wire_names() {
        let v = serde_json::to_value(run_at(0)).unwrap();
        assert!(v.get("runId").is_some());
        assert!(v.get("duration_ms").is_some());
        assert_eq!(v["triggeredBy"], "scheduled");
        assert!(v.get("dataQualityScore").is_some());
    }
}
