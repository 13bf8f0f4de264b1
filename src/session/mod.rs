// ABOUTME: Session module - per-run agent lifecycle and operation history.
// ABOUTME: Contains agent status, file-operation events, and the tracker.

mod operation;
mod status;
mod tracker;

pub use operation::{FileOperation, FileOperationEvent, content_hash, hash_file};
pub use status::{AgentState, AgentStatus, StatusUpdate};
pub use tracker::{DebugSession, SessionTracker, TokenUsage};

#[cfg(test)]
mod tracker_test;
