// ABOUTME: Low-level lock-file operations: atomic create, read, delete.
// ABOUTME: The create-if-absent filesystem primitive is the sole mutex.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::record::{LockMode, LockRecord, lock_file_name};
use crate::error::LockError;

/// Result of a non-blocking lock status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    /// Owner of the lock, when the record is readable. A lock file that
    /// exists but cannot be parsed (crash mid-write) reports `None`.
    pub owner_id: Option<u32>,
    /// Age of the lock, from the record timestamp or the file mtime.
    pub age: Option<Duration>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            owner_id: None,
            age: None,
        }
    }
}

/// Atomic create/read/delete of individual lock files.
///
/// Each held lock is one JSON file in the lock directory, named by the
/// deterministic path encoding. Atomicity comes entirely from the
/// filesystem's exclusive-create: there is no shared memory and no daemon,
/// so any cooperating process on the same filesystem participates equally.
///
/// These operations never block and never retry; the retry loop lives in
/// [`LockManager`](super::LockManager).
pub struct LockPrimitives {
    lock_dir: PathBuf,
    stale_threshold: Duration,
}

impl LockPrimitives {
    /// Create primitives over the given lock directory, creating it if needed.
    pub fn new(
        lock_dir: impl Into<PathBuf>,
        stale_threshold: Duration,
    ) -> Result<Self, LockError> {
        let lock_dir = lock_dir.into();
        std::fs::create_dir_all(&lock_dir)?;
        Ok(Self {
            lock_dir,
            stale_threshold,
        })
    }

    /// The lock file path for a target path.
    pub fn lock_path(&self, path: &str) -> PathBuf {
        self.lock_dir.join(lock_file_name(path))
    }

    /// Attempt an exclusive, atomic create of a lock record.
    ///
    /// Returns `Ok(true)` when the lock was taken. On conflict, inspects the
    /// existing record: if it is older than the stale threshold it is
    /// deleted best-effort (a concurrent reclaimer winning the delete race
    /// is harmless) and `Ok(false)` is returned so the caller can retry
    /// immediately. Never blocks.
    pub async fn try_acquire(
        &self,
        path: &str,
        agent_id: u32,
        mode: LockMode,
    ) -> Result<bool, LockError> {
        let lock_path = self.lock_path(path);
        let record = LockRecord::new(path, agent_id, mode);
        let body = serde_json::to_string_pretty(&record)?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                file.write_all(body.as_bytes())?;
                debug!(path, agent_id, "lock acquired");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Some(age) = observed_age(&lock_path) {
                    if age > self.stale_threshold {
                        warn!(
                            path,
                            age_ms = age.as_millis() as u64,
                            "removing stale lock"
                        );
                        remove_ignoring_missing(&lock_path)?;
                    }
                }
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the current lock state for a target path.
    ///
    /// Absence is reported as unlocked, not an error.
    pub async fn status(&self, path: &str) -> Result<LockStatus, LockError> {
        let lock_path = self.lock_path(path);
        if !lock_path.exists() {
            return Ok(LockStatus::unlocked());
        }

        match read_record(&lock_path) {
            Ok(record) => Ok(LockStatus {
                locked: true,
                owner_id: Some(record.agent_id),
                age: Some(record.age()),
            }),
            Err(_) => {
                // Unparsable record: present but owner unknown. Age falls
                // back to the file mtime so staleness checks still work.
                Ok(LockStatus {
                    locked: true,
                    owner_id: None,
                    age: file_age(&lock_path),
                })
            }
        }
    }

    /// Release a lock held by `agent_id`.
    ///
    /// Releasing a lock held by another agent is an ownership violation and
    /// leaves the lock untouched. Releasing a non-existent lock is a no-op,
    /// tolerating double-release from crash-recovery paths. An unparsable
    /// record cannot be ownership-checked and is left for the stale sweep.
    pub async fn release(&self, path: &str, agent_id: u32) -> Result<(), LockError> {
        let lock_path = self.lock_path(path);
        if !lock_path.exists() {
            debug!(path, agent_id, "release of non-existent lock ignored");
            return Ok(());
        }

        let record = match read_record(&lock_path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path, error = %e, "unreadable lock record on release, leaving for sweep");
                return Ok(());
            }
        };

        if record.agent_id != agent_id {
            return Err(LockError::NotOwner {
                path: path.to_string(),
                owner_id: record.agent_id,
                requester_id: agent_id,
            });
        }

        remove_ignoring_missing(&lock_path)?;
        debug!(path, agent_id, "lock released");
        Ok(())
    }

    /// Delete the lock for `path` if it is older than `threshold`.
    ///
    /// Returns the number of records removed (0 or 1) for batch cleanup.
    pub async fn clean_if_stale(
        &self,
        path: &str,
        threshold: Duration,
    ) -> Result<usize, LockError> {
        let lock_path = self.lock_path(path);
        match observed_age(&lock_path) {
            Some(age) if age > threshold => {
                warn!(path, age_ms = age.as_millis() as u64, "cleaned stale lock");
                remove_ignoring_missing(&lock_path)?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    /// Enumerate all readable lock records in the lock directory.
    ///
    /// Unreadable or corrupt entries are skipped with a warning; they are
    /// reclaimed by age via the stale sweep, not reported here.
    pub async fn list_all(&self) -> Result<Vec<LockRecord>, LockError> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.lock_dir)? {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            match read_record(&file_path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(file = %file_path.display(), error = %e, "skipping unreadable lock file");
                }
            }
        }
        Ok(records)
    }
}

fn read_record(lock_path: &Path) -> Result<LockRecord, LockError> {
    let content = std::fs::read_to_string(lock_path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Age of the lock at `lock_path`: the record timestamp when readable,
/// the file mtime otherwise. `None` when the file is gone.
fn observed_age(lock_path: &Path) -> Option<Duration> {
    match read_record(lock_path) {
        Ok(record) => Some(record.age()),
        Err(_) => file_age(lock_path),
    }
}

fn file_age(lock_path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(lock_path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}

/// Delete a file, treating a concurrent delete by another reclaimer as success.
fn remove_ignoring_missing(lock_path: &Path) -> Result<(), LockError> {
    match std::fs::remove_file(lock_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
