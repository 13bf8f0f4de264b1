// ABOUTME: Agent lifecycle state and per-agent status for a debug session.
// ABOUTME: Transitions are caller-reported; the tracker never infers state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an agent within a session.
///
/// `pending -> running -> {waiting <-> running} -> complete | failed`.
/// The waiting state is reported by the lock-facing caller when an
/// `acquire` blocks; nothing here detects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Pending,
    Running,
    Waiting,
    Complete,
    Failed,
}

impl AgentState {
    /// True for `Complete` and `Failed`, the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Complete | AgentState::Failed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Pending => "pending",
            AgentState::Running => "running",
            AgentState::Waiting => "waiting",
            AgentState::Complete => "complete",
            AgentState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-agent status retained for the life of a debug session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub id: u32,
    pub sequence_number: u32,
    pub state: AgentState,
    pub tokens_used: u64,
    pub files_modified: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentStatus {
    /// Fresh status in the `Pending` state.
    pub fn new(id: u32, sequence_number: u32) -> Self {
        Self {
            id,
            sequence_number,
            state: AgentState::Pending,
            tokens_used: 0,
            files_modified: Vec::new(),
            current_operation: None,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Apply a partial update, stamping start/end times on the
    /// corresponding transitions.
    pub fn apply(&mut self, update: StatusUpdate) {
        if let Some(state) = update.state {
            if state == AgentState::Running && self.started_at.is_none() {
                self.started_at = Some(Utc::now());
            }
            if state.is_terminal() && self.ended_at.is_none() {
                self.ended_at = Some(Utc::now());
            }
            self.state = state;
        }
        if let Some(op) = update.current_operation {
            self.current_operation = Some(op);
        }
        if let Some(path) = update.file_modified {
            if !self.files_modified.contains(&path) {
                self.files_modified.push(path);
            }
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }
}

/// Partial update to an agent's status. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub state: Option<AgentState>,
    pub current_operation: Option<String>,
    pub file_modified: Option<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    /// Update that only changes the lifecycle state.
    pub fn state(state: AgentState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Terminal failure with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(AgentState::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.current_operation = Some(op.into());
        self
    }

    pub fn with_file_modified(mut self, path: impl Into<String>) -> Self {
        self.file_modified = Some(path.into());
        self
    }
}
