//! Per-project process lock.
//!
//! A JSON lock file guards each project's data directory so only one scan
//! or search session mutates the stores at a time. A lock is considered
//! invalid when the file is absent, older than the TTL, or its owning
//! process is gone; acquisition steals invalid locks and verifies ownership
//! by re-reading the file afterwards.

use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{CwError, CwResult};

/// How long acquisition keeps probing before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between probes.
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Age beyond which a lock is stale regardless of its owner.
const LOCK_TTL_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    timestamp: i64,
    operation: String,
}

/// A held project lock. Released on [`release`](ProcessLock::release) or drop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    pid: u32,
}

impl ProcessLock {
    /// Acquire the lock at `path`, waiting up to 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CwError::LockTimeout`] when a valid lock persists past the
    /// wait window, or [`CwError::LockIo`] on filesystem failures.
    pub fn acquire(path: &Path, operation: &str) -> CwResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CwError::lock_io(parent, e.to_string()))?;
        }

        let pid = std::process::id();
        let started = Instant::now();

        loop {
            if !lock_is_valid(path) {
                let payload = LockPayload {
                    pid,
                    timestamp: now_ms(),
                    operation: operation.to_string(),
                };
                let body = serde_json::to_string(&payload)?;
                std::fs::write(path, body).map_err(|e| CwError::lock_io(path, e.to_string()))?;

                // Re-read to guard against a concurrent writer winning the race.
                if read_payload(path).map(|p| p.pid) == Some(pid) {
                    debug!("Acquired lock {:?} for {operation}", path);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
            }

            if started.elapsed() >= ACQUIRE_TIMEOUT {
                return Err(CwError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(PROBE_INTERVAL);
        }
    }

    /// Release the lock. Only removes the file if this process still owns it.
    pub fn release(self) {
        // Drop does the work.
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        match read_payload(&self.path) {
            Some(payload) if payload.pid == self.pid => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!("Failed to remove lock {:?}: {e}", self.path);
                }
            }
            Some(_) => warn!("Lock {:?} taken over by another process", self.path),
            None => {}
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn read_payload(path: &Path) -> Option<LockPayload> {
    let body = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&body).ok()
}

/// A lock is valid only if the file parses, is younger than the TTL, and
/// its PID is still alive.
fn lock_is_valid(path: &Path) -> bool {
    let Some(payload) = read_payload(path) else {
        return false;
    };
    if now_ms() - payload.timestamp > LOCK_TTL_MS {
        return false;
    }
    pid_alive(payload.pid)
}

/// Signal-0 probe for process liveness.
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.lock");

        let lock = ProcessLock::acquire(&path, "scan").unwrap();
        assert!(path.exists());

        let payload = read_payload(&path).unwrap();
        assert_eq!(payload.pid, std::process::id());
        assert_eq!(payload.operation, "scan");

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_stolen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.lock");

        let stale = LockPayload {
            pid: std::process::id(),
            timestamp: now_ms() - LOCK_TTL_MS - 1000,
            operation: "scan".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = ProcessLock::acquire(&path, "scan").unwrap();
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn dead_pid_lock_is_stolen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.lock");

        // PID near the u32 ceiling is not a live process.
        let dead = LockPayload {
            pid: u32::MAX - 1,
            timestamp: now_ms(),
            operation: "scan".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&dead).unwrap()).unwrap();

        let lock = ProcessLock::acquire(&path, "scan").unwrap();
        drop(lock);
    }

    #[test]
    fn garbage_lock_file_is_stolen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.lock");
        std::fs::write(&path, "not json").unwrap();

        let lock = ProcessLock::acquire(&path, "scan").unwrap();
        drop(lock);
    }

    #[test]
    fn release_respects_takeover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.lock");

        let lock = ProcessLock::acquire(&path, "scan").unwrap();

        // Simulate another process stealing the lock.
        let other = LockPayload {
            pid: std::process::id().wrapping_add(1),
            timestamp: now_ms(),
            operation: "scan".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&other).unwrap()).unwrap();

        drop(lock);
        // The foreign lock must survive our release.
        assert!(path.exists());
    }
}
