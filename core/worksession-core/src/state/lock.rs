//! Exclusive lock around the session store's read-modify-write cycle.
//!
//! # Lock Directory Structure
//!
//! Location: next to the store file, `sessions.json` → `sessions.lock/`.
//! Directory creation is atomic, so whoever creates it holds the lock.
//!
//! ```text
//! sessions.lock/
//! └── meta.json    # { pid, created }
//! ```
//!
//! # Stale Locks
//!
//! A writer that crashes leaves its lock behind. A lock whose PID is no longer
//! alive is taken over. A lock without readable metadata is only taken over once
//! it is older than [`METADATA_GRACE`], since its owner may still be writing
//! `meta.json`.
//!
//! Removal of a stale lock happens under a second, short-lived directory
//! (`sessions.lock.takeover/`), and staleness is checked again once it is held.
//! Two waiters that both saw the same dead lock therefore cannot remove a fresh
//! lock that one of them created in the meantime.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, WorksessionError};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);
const METADATA_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// Lock creation time (Unix seconds).
    pub created: u64,
}

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: kill(pid, 0) is the standard POSIX liveness probe; it sends no signal.
        #[allow(unsafe_code)]
        let result = unsafe { libc::kill(pid as i32, 0) };
        if result == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Held for as long as the value lives; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    dir: PathBuf,
}

impl StoreLock {
    /// Lock directory guarding `store_file`.
    pub fn lock_dir_for(store_file: &Path) -> PathBuf {
        store_file.with_extension("lock")
    }

    /// Blocks until the lock is acquired or `timeout` elapses.
    pub fn acquire(store_file: &Path, timeout: Duration) -> Result<Self> {
        let dir = Self::lock_dir_for(store_file);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| WorksessionError::io("Failed to create store directory", e))?;
        }

        let started = Instant::now();
        loop {
            match fs::create_dir(&dir) {
                Ok(()) => {
                    write_lock_metadata(&dir)?;
                    debug!(path = %dir.display(), "Store lock acquired");
                    return Ok(StoreLock { dir });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&dir) && take_over_stale(&dir) {
                        continue;
                    }
                }
                Err(e) => return Err(WorksessionError::io("Failed to create store lock", e)),
            }

            if started.elapsed() >= timeout {
                return Err(WorksessionError::LockTimeout {
                    path: dir,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(error = %e, path = %self.dir.display(), "Failed to release store lock");
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn write_lock_metadata(dir: &Path) -> Result<()> {
    let info = LockInfo {
        pid: std::process::id(),
        created: now_secs(),
    };
    let content = serde_json::to_string(&info).map_err(|e| WorksessionError::Json {
        context: "Failed to serialize lock metadata".to_string(),
        source: e,
    })?;
    fs::write(dir.join("meta.json"), content).map_err(|e| {
        let _ = fs::remove_dir_all(dir);
        WorksessionError::io("Failed to write lock metadata", e)
    })
}

pub fn read_lock_info(dir: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(dir.join("meta.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn age(path: &Path) -> Option<Duration> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
}

fn is_stale(dir: &Path) -> bool {
    match read_lock_info(dir) {
        Some(info) => !is_pid_alive(info.pid),
        None => age(dir).is_some_and(|age| age > METADATA_GRACE),
    }
}

fn takeover_dir(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".takeover");
    PathBuf::from(name)
}

/// Removes `dir` if it is still stale once the takeover guard is held. Returns
/// true if the stale lock is gone and acquisition should be retried at once.
fn take_over_stale(dir: &Path) -> bool {
    let guard = takeover_dir(dir);
    match fs::create_dir(&guard) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // A guard outlives its holder only if that process died mid-takeover.
            if age(&guard).is_some_and(|age| age > METADATA_GRACE) {
                warn!(path = %guard.display(), "Removing abandoned lock takeover guard");
                let _ = fs::remove_dir(&guard);
            }
            return false;
        }
        Err(e) => {
            warn!(error = %e, path = %guard.display(), "Failed to create lock takeover guard");
            return false;
        }
    }

    let removed = if is_stale(dir) {
        warn!(path = %dir.display(), "Taking over stale store lock");
        fs::remove_dir_all(dir).is_ok()
    } else {
        false
    };
    if let Err(e) = fs::remove_dir(&guard) {
        warn!(error = %e, path = %guard.display(), "Failed to release lock takeover guard");
    }
    removed
}
