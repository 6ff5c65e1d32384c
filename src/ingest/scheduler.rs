// src/ingest/scheduler.rs
//! Sync scheduler: owns timing and the single-flight token.
//!
//! A run starts only when the token is free; a trigger arriving while a run is
//! in flight returns the current status without side effects. The timer is
//! re-armed `interval` after each run completes (scheduled or manual), so
//! scheduling drift can never stack runs. `stop()` disarms the timer only; a
//! run already in flight always finishes and is recorded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clock::SharedClock;
use crate::engine::SyncEngine;
use crate::error::{RunError, SyncError};
use crate::history::{SyncHistory, SyncRun, TriggeredBy};
use crate::ingest::config::MAX_INTERVAL_SECS;
use crate::lock::{SharedLock, SyncLockGuard};

/// Bounds for `SchedulerCfg::interval`; values outside are clamped.
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_SECS);

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub sync_on_start: bool,
    pub history_capacity: usize,
}

/// Read-only view returned by `status()` and by rejected triggers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<SyncRun>,
    #[serde(rename = "nextSyncIn_ms")]
    pub next_sync_in_ms: Option<u64>,
    pub history: Vec<SyncRun>,
    /// In-flight run (finishedAt = null), if this process owns it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_run: Option<SyncRun>,
    pub scheduler_armed: bool,
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// This call ran the pass; the finished run is also in history.
    Completed(SyncRun),
    /// Another run holds the token; nothing was started.
    Rejected(SyncStatus),
}

#[derive(Debug, Clone, Copy)]
struct NextTick {
    at: Instant,
    at_wall: DateTime<Utc>,
}

impl NextTick {
    /// Tick `delay` from now. Never panics: the delay is capped at
    /// `MAX_INTERVAL` and both clocks saturate instead of overflowing.
    fn after(now_wall: DateTime<Utc>, delay: Duration) -> Self {
        let delay = delay.min(MAX_INTERVAL);
        let now = Instant::now();
        let at_wall = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now_wall.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            at: now.checked_add(delay).unwrap_or(now),
            at_wall,
        }
    }
}

struct Inner {
    engine: Arc<SyncEngine>,
    lock: SharedLock,
    history: SyncHistory,
    clock: SharedClock,
    cfg: SchedulerCfg,
    current: Mutex<Option<SyncRun>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    next: Mutex<Option<NextTick>>,
    rearm: Notify,
}

fn lock_or_recover<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl Inner {
    fn is_armed(&self) -> bool {
        lock_or_recover(&self.timer).is_some()
    }

    fn schedule_in(&self, delay: Duration) {
        *lock_or_recover(&self.next) = Some(NextTick::after(self.clock.now(), delay));
        self.rearm.notify_one();
    }

    fn status(&self) -> SyncStatus {
        let current_run = lock_or_recover(&self.current).clone();
        let now = self.clock.now();
        let next_sync_in_ms = if self.is_armed() {
            lock_or_recover(&self.next).map(|n| {
                n.at_wall
                    .signed_duration_since(now)
                    .num_milliseconds()
                    .max(0) as u64
            })
        } else {
            None
        };
        SyncStatus {
            is_syncing: current_run.is_some() || self.lock.is_locked(),
            last_sync: self.history.latest(),
            next_sync_in_ms,
            history: self.history.snapshot(),
            current_run,
            scheduler_armed: self.is_armed(),
        }
    }

    fn finish_run(&self, run: SyncRun) {
        let outcome = if run.success { "success" } else { "failure" };
        counter!(
            "sync_runs_total",
            "trigger" => run.triggered_by.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("sync_duration_ms").record(run.duration_ms as f64);
        gauge!("sync_data_quality").set(run.data_quality_score);
        gauge!("sync_last_run_ts").set(self.clock.now().timestamp() as f64);

        if run.success {
            tracing::info!(
                target: "sync",
                run_id = %run.run_id,
                trigger = run.triggered_by.as_str(),
                models = run.models_count,
                updated = run.models_updated,
                pricing = run.pricing_updated,
                invalid = run.invalid_records,
                errors = run.errors.len(),
                quality = run.data_quality_score,
                duration_ms = run.duration_ms,
                "sync finished"
            );
        } else {
            tracing::warn!(
                target: "sync",
                run_id = %run.run_id,
                trigger = run.triggered_by.as_str(),
                errors = ?run.errors,
                duration_ms = run.duration_ms,
                "sync failed"
            );
        }

        self.history.push(run);
        *lock_or_recover(&self.current) = None;
        if self.is_armed() {
            self.schedule_in(self.cfg.interval);
        }
    }
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, lock: SharedLock, mut cfg: SchedulerCfg) -> Self {
        crate::ingest::ensure_metrics_described();
        let interval = cfg.interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        if interval != cfg.interval {
            tracing::warn!(
                target: "sync",
                requested_ms = cfg.interval.as_millis() as u64,
                interval_secs = interval.as_secs(),
                "scheduler interval clamped"
            );
            cfg.interval = interval;
        }
        let clock = Arc::clone(engine.clock());
        Self {
            inner: Arc::new(Inner {
                engine,
                lock,
                history: SyncHistory::with_capacity(cfg.history_capacity),
                clock,
                cfg,
                current: Mutex::new(None),
                timer: Mutex::new(None),
                next: Mutex::new(None),
                rearm: Notify::new(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    /// Arm the timer. Returns false if it was already armed.
    pub fn start(&self) -> bool {
        let mut timer = lock_or_recover(&self.inner.timer);
        if timer.is_some() {
            return false;
        }
        let first = if self.inner.cfg.sync_on_start {
            Duration::ZERO
        } else {
            self.inner.cfg.interval
        };
        *lock_or_recover(&self.inner.next) = Some(NextTick::after(self.inner.clock.now(), first));
        let this = self.clone();
        *timer = Some(tokio::spawn(async move { this.timer_loop().await }));
        tracing::info!(
            target: "sync",
            interval_secs = self.inner.cfg.interval.as_secs(),
            sync_on_start = self.inner.cfg.sync_on_start,
            "sync scheduler started"
        );
        true
    }

    /// Disarm the timer. Never cancels a run in flight. Returns false if it
    /// was not armed.
    pub fn stop(&self) -> bool {
        let handle = lock_or_recover(&self.inner.timer).take();
        *lock_or_recover(&self.inner.next) = None;
        match handle {
            Some(h) => {
                // Runs execute on their own task, so aborting the timer loop
                // leaves an in-flight run untouched.
                h.abort();
                tracing::info!(target: "sync", "sync scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.is_armed()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    pub fn history(&self) -> Vec<SyncRun> {
        self.inner.history.snapshot()
    }

    async fn timer_loop(self) {
        loop {
            let next = *lock_or_recover(&self.inner.next);
            let Some(next) = next else {
                self.inner.rearm.notified().await;
                continue;
            };
            tokio::select! {
                _ = tokio::time::sleep_until(next.at) => {}
                _ = self.inner.rearm.notified() => continue,
            }
            match self.trigger(TriggeredBy::Scheduled).await {
                TriggerOutcome::Completed(_) => {}
                TriggerOutcome::Rejected(_) => {
                    tracing::debug!(target: "sync", "scheduled tick skipped, sync in progress");
                    self.inner.schedule_in(self.inner.cfg.interval);
                }
            }
        }
    }

    /// Manual trigger.
    pub async fn trigger_sync(&self) -> TriggerOutcome {
        self.trigger(TriggeredBy::Manual).await
    }

    pub async fn trigger(&self, by: TriggeredBy) -> TriggerOutcome {
        let inner = &self.inner;
        let mut run = SyncRun::begin(by, inner.clock.now());
        let owner = run.run_id.to_string();

        let guard = match SyncLockGuard::try_acquire(&inner.lock, &owner) {
            Ok(Some(g)) => g,
            Ok(None) => {
                counter!("sync_rejected_total").increment(1);
                tracing::info!(target: "sync", trigger = by.as_str(), "sync already in progress, trigger ignored");
                return TriggerOutcome::Rejected(inner.status());
            }
            Err(e) => {
                run.errors.push(e.to_entry());
                run.finish(inner.clock.now());
                inner.finish_run(run.clone());
                return TriggerOutcome::Completed(run);
            }
        };

        *lock_or_recover(&inner.current) = Some(run.clone());
        tracing::info!(target: "sync", run_id = %run.run_id, trigger = by.as_str(), "sync started");

        // The pass runs on its own task so that a dropped caller, `stop()`,
        // or a panic inside the engine cannot leave the run half-recorded.
        let task_inner = Arc::clone(inner);
        let fallback = run.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let engine = Arc::clone(&task_inner.engine);
            let penalty = engine.error_penalty();
            match tokio::spawn(async move { engine.run().await }).await {
                Ok(report) => report.record_into(&mut run, penalty),
                Err(join_err) => {
                    run.success = false;
                    run.errors.push(RunError {
                        provider: "engine".into(),
                        message: format!("run panicked: {join_err}"),
                    });
                }
            }
            run.finish(task_inner.clock.now());
            task_inner.finish_run(run.clone());
            run
        });

        match handle.await {
            Ok(run) => TriggerOutcome::Completed(run),
            Err(join_err) => {
                let mut run = fallback;
                run.errors.push(
                    SyncError::Lock(format!("run task failed: {join_err}")).to_entry(),
                );
                run.finish(inner.clock.now());
                *lock_or_recover(&inner.current) = None;
                TriggerOutcome::Completed(run)
            }
        }
    }
}
