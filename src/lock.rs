// src/lock.rs
//! Single-flight token for synchronization runs.
//!
//! Acquisition is compare-and-set: a caller either gets the token or is told
//! it is taken. There is no waiting and no queue. For deployments with more
//! than one process use [`FileSyncLock`] on a shared volume (or another
//! [`SyncLock`] backed by an external store).

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;

pub trait SyncLock: Send + Sync {
    /// `Ok(true)` if the token was free and is now held by `owner`.
    fn try_acquire(&self, owner: &str) -> Result<bool, SyncError>;

    /// Release if held by `owner`; releasing a token held by someone else is a no-op.
    fn release(&self, owner: &str) -> Result<(), SyncError>;

    fn is_locked(&self) -> bool;
}

pub type SharedLock = Arc<dyn SyncLock>;

/// Releases the token when dropped, so a failed or panicking run cannot leak it.
pub struct SyncLockGuard {
    lock: SharedLock,
    owner: String,
}

impl SyncLockGuard {
    /// `Ok(None)` when another run holds the token.
    pub fn try_acquire(lock: &SharedLock, owner: &str) -> Result<Option<Self>, SyncError> {
        if lock.try_acquire(owner)? {
            Ok(Some(Self {
                lock: Arc::clone(lock),
                owner: owner.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release(&self.owner) {
            tracing::warn!(target: "sync", owner = %self.owner, error = %e, "failed to release sync lock");
        }
    }
}

/// In-process token. Sufficient when exactly one process runs the scheduler.
#[derive(Debug, Default)]
pub struct LocalSyncLock {
    held: AtomicBool,
    owner: Mutex<Option<String>>,
}

impl LocalSyncLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncLock for LocalSyncLock {
    fn try_acquire(&self, owner: &str) -> Result<bool, SyncError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        *self.owner.lock().unwrap_or_else(|p| p.into_inner()) = Some(owner.to_string());
        Ok(true)
    }

    fn release(&self, owner: &str) -> Result<(), SyncError> {
        let mut g = self.owner.lock().unwrap_or_else(|p| p.into_inner());
        if g.as_deref() == Some(owner) {
            *g = None;
            self.held.store(false, Ordering::Release);
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Cross-process token backed by an exclusive advisory lock on a lock file.
///
/// The file itself is never removed; holding the token means holding the OS
/// lock on an open handle. The kernel drops the lock when the holder exits,
/// so a crashed process cannot leave an abandoned lease behind and a live
/// holder never needs to renew it. The file content names the current owner.
#[derive(Debug)]
pub struct FileSyncLock {
    path: PathBuf,
    held: Mutex<Option<(String, File)>>,
}

impl FileSyncLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            held: Mutex::new(None),
        }
    }

    fn io_err(&self, what: &str, e: std::io::Error) -> SyncError {
        SyncError::Lock(format!("{what} {}: {e}", self.path.display()))
    }

    fn open(&self) -> Result<File, SyncError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err("creating dir for", e))?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_err("opening", e))
    }
}

impl SyncLock for FileSyncLock {
    fn try_acquire(&self, owner: &str) -> Result<bool, SyncError> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if held.is_some() {
            return Ok(false);
        }
        let mut file = self.open()?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(false),
            Err(TryLockError::Error(e)) => return Err(self.io_err("locking", e)),
        }
        file.set_len(0)
            .and_then(|()| file.write_all(owner.as_bytes()))
            .and_then(|()| file.flush())
            .map_err(|e| self.io_err("writing owner to", e))?;
        *held = Some((owner.to_string(), file));
        Ok(true)
    }

    fn release(&self, owner: &str) -> Result<(), SyncError> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.as_ref().is_some_and(|(o, _)| o == owner) {
            return Ok(());
        }
        if let Some((_, file)) = held.take() {
            if let Err(e) = file.set_len(0) {
                tracing::warn!(target: "sync", path = %self.path.display(), error = %e, "could not clear lock owner");
            }
            file.unlock().map_err(|e| self.io_err("unlocking", e))?;
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        if self.held.lock().unwrap_or_else(|p| p.into_inner()).is_some() {
            return true;
        }
        // Holders write their owner and clear it on release; an empty file is free.
        let Ok(mut file) = File::open(&self.path) else {
            return false;
        };
        let mut owner = String::new();
        if file.read_to_string(&mut owner).is_err() || owner.is_empty() {
            return false;
        }
        match file.try_lock_shared() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Error(e)) => {
                tracing::warn!(target: "sync", path = %self.path.display(), error = %e, "could not check lock");
                false
            }
        }
    }
}
