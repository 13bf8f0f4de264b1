// ABOUTME: Configuration for lock coordination and session tracking.
// ABOUTME: Serializes to config.json inside each debug session directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by the lock manager, session tracker, and monitor.
///
/// Defaults are chosen so the poll interval is far below typical lock hold
/// durations and the stale thresholds are far above them. Durations are
/// stored as milliseconds so the config round-trips through JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Directory holding one file per currently-held lock.
    pub lock_dir: PathBuf,

    /// Root directory under which session directories are created.
    pub session_root: PathBuf,

    /// How long `acquire` sleeps between attempts, in milliseconds.
    pub poll_interval_ms: u64,

    /// Default patience for `acquire` when the caller gives none, in milliseconds.
    pub default_timeout_ms: u64,

    /// Age beyond which a lock is considered abandoned, in milliseconds.
    pub stale_threshold_ms: u64,

    /// How often the background sweeper runs, in milliseconds.
    pub sweep_interval_ms: u64,

    /// Age threshold used by the background sweeper, in milliseconds.
    /// Longer than `stale_threshold_ms` since the sweep runs unattended.
    pub sweep_threshold_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lock_dir: PathBuf::from(".warden/locks"),
            session_root: PathBuf::from(".warden/sessions"),
            poll_interval_ms: 100,
            default_timeout_ms: 30_000,
            stale_threshold_ms: 5 * 60 * 1000,
            sweep_interval_ms: 60_000,
            sweep_threshold_ms: 10 * 60 * 1000,
        }
    }
}

impl CoordinationConfig {
    /// Create a config rooted at the given directory, with default timings.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            lock_dir: root.join("locks"),
            session_root: root.join("sessions"),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn sweep_threshold(&self) -> Duration {
        Duration::from_millis(self.sweep_threshold_ms)
    }
}
