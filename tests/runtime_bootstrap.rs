// tests/runtime_bootstrap.rs
//
// SyncRuntime wiring with on-disk store, lock lease and snapshots.

mod common;

use common::*;
use model_status_sync::ingest::DynAdapter;
use model_status_sync::lock::{FileSyncLock, SyncLock};
use model_status_sync::store::{JsonFileStore, ModelStore};
use model_status_sync::{SyncConfig, SyncRuntime, TriggerOutcome};

#[tokio::test]
async fn file_backed_runtime_persists_across_restarts() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = SyncConfig {
        sync_on_start: false,
        store_path: Some(tmp.path().join("models.json")),
        lock_path: Some(tmp.path().join("sync.lock")),
        snapshot_dir: Some(tmp.path().join("snapshots")),
        ..SyncConfig::default()
    };
    let adapters: Vec<DynAdapter> = vec![StaticAdapter::shared(
        "openai",
        vec![obs("openai", "gpt-4o").complete().avail(97.0)],
    )];

    let rt = SyncRuntime::with_adapters(cfg.clone(), adapters.clone()).await.unwrap();
    let TriggerOutcome::Completed(run) = rt.scheduler.trigger_sync().await else {
        panic!("trigger should run");
    };
    assert!(run.success, "{:?}", run.errors);
    assert_eq!(run.models_updated, 1);
    assert!(
        !FileSyncLock::new(tmp.path().join("sync.lock")).is_locked(),
        "lease released after run"
    );
    assert!(tmp.path().join("snapshots/latest.json").exists());

    // A fresh runtime on the same files sees the committed record.
    let reopened = JsonFileStore::open(tmp.path().join("models.json")).await.unwrap();
    let r = reopened.get("openai-gpt-4o").await.unwrap().expect("persisted");
    assert_eq!(r.availability_pct, Some(97.0));

    let rt2 = SyncRuntime::with_adapters(cfg, adapters).await.unwrap();
    let TriggerOutcome::Completed(run) = rt2.scheduler.trigger_sync().await else {
        panic!("trigger should run");
    };
    assert_eq!(run.models_updated, 0);
}

#[tokio::test]
async fn held_file_lease_rejects_a_second_process() {
    let tmp = tempfile::tempdir().unwrap();
    let lock = tmp.path().join("sync.lock");
    // Another process holds the lease through its own handle.
    let other = FileSyncLock::new(&lock);
    assert!(other.try_acquire("other-host:1234").unwrap());

    let cfg = SyncConfig {
        sync_on_start: false,
        lock_path: Some(lock.clone()),
        ..SyncConfig::default()
    };
    let rt = SyncRuntime::with_adapters(cfg, Vec::new()).await.unwrap();
    match rt.scheduler.trigger_sync().await {
        TriggerOutcome::Rejected(status) => assert!(status.is_syncing),
        TriggerOutcome::Completed(_) => panic!("lease held elsewhere"),
    }
    assert!(rt.scheduler.history().is_empty());
    assert_eq!(std::fs::read_to_string(&lock).unwrap(), "other-host:1234", "foreign lease untouched");

    other.release("other-host:1234").unwrap();
    assert!(matches!(rt.scheduler.trigger_sync().await, TriggerOutcome::Completed(_)));
}
