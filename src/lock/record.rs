// ABOUTME: LockRecord wire type and the deterministic lock-filename encoding.
// ABOUTME: One JSON record file per held lock, named purely from the target path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Maximum length of the sanitized path suffix embedded in a lock filename.
/// Keeps filenames readable without risking filesystem name limits.
const NAME_SUFFIX_LEN: usize = 40;

/// Number of hex characters of the path hash appended for collision resistance.
const NAME_HASH_LEN: usize = 8;

/// The declared intent of a lock. Exclusion is mode-independent: at most one
/// record exists per path regardless of mode. The mode is recorded so the
/// monitor and operation log can distinguish read passes from mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Read => write!(f, "read"),
            LockMode::Write => write!(f, "write"),
        }
    }
}

/// The persisted claim of exclusive access to a target path.
///
/// Serialized as `{"agentId", "timestamp", "operation", "filepath"}`,
/// the on-disk format every cooperating process reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub agent_id: u32,
    pub timestamp: DateTime<Utc>,
    pub operation: LockMode,
    pub filepath: String,
}

impl LockRecord {
    /// Create a record for the given path, stamped now.
    pub fn new(filepath: impl Into<String>, agent_id: u32, operation: LockMode) -> Self {
        Self {
            agent_id,
            timestamp: Utc::now(),
            operation,
            filepath: filepath.into(),
        }
    }

    /// Age of the lock against the wall clock. A record stamped in the
    /// future (clock skew between agents) reports zero age.
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().signed_duration_since(self.timestamp);
        elapsed.to_std().unwrap_or(Duration::ZERO)
    }
}

/// Compute the lock filename for a target path.
///
/// Pure function of the path: sanitized tail for readability plus a SHA-256
/// prefix for collision resistance, so any process computes the same name
/// independently without coordination.
pub fn lock_file_name(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let tail_start = sanitized.len().saturating_sub(NAME_SUFFIX_LEN);
    let tail = &sanitized[tail_start..];

    let digest = Sha256::digest(path.as_bytes());
    let hash = hex::encode(&digest[..]);

    format!("{}-{}.lock", tail, &hash[..NAME_HASH_LEN])
}
