//! Per-spec advisory merge lock.
//!
//! Lock files live at `.auto-claude/.locks/merge-<spec>.lock` and carry a
//! `{spec_name, timestamp, pid}` payload. A lock is stale, and may be
//! reclaimed, if its timestamp is older than the configured threshold or its
//! pid is no longer alive.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::liveness::is_pid_alive;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    spec_name: String,
    timestamp: u64,
    pid: i32,
}

fn lock_path(project_root: &Path, spec: &str) -> PathBuf {
    project_root
        .join(".auto-claude")
        .join(".locks")
        .join(format!("merge-{spec}.lock"))
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// RAII guard for a held merge lock. Releases on drop so the lock is freed on
/// every exit path: early return, `?`, or panic unwind.
pub struct MergeLockGuard {
    path: PathBuf,
    released: bool,
}

impl MergeLockGuard {
    /// Attempt to acquire the merge lock for `spec`.
    ///
    /// `stale_after_secs` is the configured staleness threshold (default 300s
    /// per [`crate::config::CoreConfig`]).
    pub fn acquire(project_root: &Path, spec: &str, stale_after_secs: u64) -> Result<Self, CoreError> {
        let path = lock_path(project_root, spec);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::TrackerIoError(format!("creating lock dir: {e}")))?;
        }

        if let Some(existing) = read_lock(&path) {
            let age = now_secs().saturating_sub(existing.timestamp);
            let stale = age > stale_after_secs || !is_pid_alive(existing.pid);
            if !stale {
                return Err(CoreError::LockHeld {
                    spec: spec.to_string(),
                    holder_pid: existing.pid,
                });
            }
            log::debug!(
                "reclaiming stale merge lock for '{spec}' (age={age}s, pid={})",
                existing.pid
            );
        }

        let record = LockRecord {
            spec_name: spec.to_string(),
            timestamp: now_secs(),
            pid: std::process::id() as i32,
        };
        crate::util::write_json_atomic(&path, &record)
            .map_err(|e| CoreError::TrackerIoError(format!("writing lock: {e}")))?;

        Ok(Self {
            path,
            released: false,
        })
    }

    /// Explicitly release the lock. Also happens automatically on drop.
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to release merge lock {}: {e}", self.path.display());
            }
        }
    }
}

impl Drop for MergeLockGuard {
    fn drop(&mut self) {
        self.do_release();
    }
}

fn read_lock(path: &Path) -> Option<LockRecord> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(_) => {
            // Malformed payload: treat as absent rather than perpetually locked.
            let _ = std::fs::remove_file(path);
            None
        }
    }
}
