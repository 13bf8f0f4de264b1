// ABOUTME: Immutable file-operation events appended to a session's log.
// ABOUTME: Includes content hashing helpers for before/after comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// The kind of a recorded file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Read,
    Write,
    Lock,
    Unlock,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Lock => "lock",
            FileOperation::Unlock => "unlock",
        };
        write!(f, "{}", s)
    }
}

/// One recorded operation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_id: u32,
    pub operation: FileOperation,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_hash: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
}

impl FileOperationEvent {
    /// A successful event stamped now, with no content hashes.
    pub fn new(agent_id: u32, operation: FileOperation, path: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id,
            operation,
            path: path.into(),
            before_hash: None,
            after_hash: None,
            success: true,
            duration_ms: 0,
        }
    }

    pub fn with_hashes(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before_hash = before;
        self.after_hash = after;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// SHA-256 of a byte slice, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file's current contents. `None` when the file is unreadable,
/// which callers record as an absent hash rather than an error.
pub fn hash_file(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| content_hash(&bytes))
}
