// ABOUTME: SessionTracker - records agent lifecycle and file operations for a run.
// ABOUTME: Persists snapshots to a sortable, timestamped session directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::operation::FileOperationEvent;
use super::status::{AgentStatus, StatusUpdate};
use crate::config::CoordinationConfig;
use crate::error::SessionError;

/// Token consumption for a session, in aggregate and per agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total: u64,
    pub by_agent: HashMap<u32, u64>,
}

/// Snapshot of one coordinated run: agent statuses, the operation log, and
/// token usage. Owned by the creating process until persisted; read-only
/// once reloaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSession {
    pub session_id: String,
    pub config: CoordinationConfig,
    /// Agent statuses ordered by sequence number.
    pub agents: Vec<AgentStatus>,
    pub operations: Vec<FileOperationEvent>,
    pub token_usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

struct TrackerState {
    agents: HashMap<u32, AgentStatus>,
    operations: Vec<FileOperationEvent>,
    token_usage: TokenUsage,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// Records per-agent lifecycle state and per-file operation history.
///
/// All transitions are caller-driven: agents explicitly report
/// start/running/waiting/complete/failed, and the lock-facing caller
/// reports waiting when an `acquire` blocks. The tracker observes, it
/// never gates lock correctness.
pub struct SessionTracker {
    session_id: String,
    session_dir: PathBuf,
    config: CoordinationConfig,
    state: RwLock<TrackerState>,
}

impl SessionTracker {
    /// Start a new session under `config.session_root`.
    ///
    /// The directory name is a sortable UTC timestamp plus a short random
    /// suffix so two sessions starting in the same second don't collide.
    pub fn new(config: CoordinationConfig) -> Result<Self, SessionError> {
        let started_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let session_id = format!(
            "session-{}-{}",
            started_at.format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        );
        let session_dir = config.session_root.join(&session_id);
        std::fs::create_dir_all(&session_dir)?;

        Ok(Self {
            session_id,
            session_dir,
            config,
            state: RwLock::new(TrackerState {
                agents: HashMap::new(),
                operations: Vec::new(),
                token_usage: TokenUsage::default(),
                started_at,
                ended_at: None,
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Register an agent. Registration resets any previous status for the id.
    pub async fn register(&self, agent_id: u32, sequence_number: u32) {
        let mut state = self.state.write().await;
        state
            .agents
            .insert(agent_id, AgentStatus::new(agent_id, sequence_number));
    }

    /// Apply a caller-reported status update.
    pub async fn update_status(
        &self,
        agent_id: u32,
        update: StatusUpdate,
    ) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        let status = state
            .agents
            .get_mut(&agent_id)
            .ok_or(SessionError::UnknownAgent(agent_id))?;
        status.apply(update);
        Ok(())
    }

    /// Append an operation event to the session log.
    pub async fn record_operation(&self, event: FileOperationEvent) {
        self.state.write().await.operations.push(event);
    }

    /// Add token usage to the session total, optionally attributed to one agent.
    pub async fn update_token_usage(&self, tokens: u64, agent_id: Option<u32>) {
        let mut state = self.state.write().await;
        state.token_usage.total += tokens;
        if let Some(id) = agent_id {
            *state.token_usage.by_agent.entry(id).or_insert(0) += tokens;
            if let Some(status) = state.agents.get_mut(&id) {
                status.tokens_used += tokens;
            }
        }
    }

    /// Mark the session finished. Idempotent.
    pub async fn finish(&self) {
        let mut state = self.state.write().await;
        if state.ended_at.is_none() {
            state.ended_at = Some(Utc::now());
        }
    }

    /// Point-in-time snapshot, safe to take during an active run.
    pub async fn snapshot(&self) -> DebugSession {
        let state = self.state.read().await;
        let mut agents: Vec<AgentStatus> = state.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.sequence_number);

        DebugSession {
            session_id: self.session_id.clone(),
            config: self.config.clone(),
            agents,
            operations: state.operations.clone(),
            token_usage: state.token_usage.clone(),
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }

    /// Write `config.json` and `session.json` into the session directory.
    pub async fn persist(&self) -> Result<(), SessionError> {
        let snapshot = self.snapshot().await;
        let config_json = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(self.session_dir.join("config.json"), config_json)?;
        let session_json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(self.session_dir.join("session.json"), session_json)?;
        Ok(())
    }

    /// Save an agent's input context as `context-<id>.json`.
    pub async fn save_agent_context(
        &self,
        agent_id: u32,
        context: &serde_json::Value,
    ) -> Result<(), SessionError> {
        let path = self.session_dir.join(format!("context-{}.json", agent_id));
        std::fs::write(path, serde_json::to_string_pretty(context)?)?;
        Ok(())
    }

    /// Save an agent's final output as `result-<id>.json`.
    pub async fn save_agent_result(
        &self,
        agent_id: u32,
        result: &serde_json::Value,
    ) -> Result<(), SessionError> {
        let path = self.session_dir.join(format!("result-{}.json", agent_id));
        std::fs::write(path, serde_json::to_string_pretty(result)?)?;
        Ok(())
    }

    /// Load a persisted session by id. Pure deserialization: no live state
    /// is touched, so it is safe to call while another process is still
    /// writing its own session. Returns `Ok(None)` when the session does
    /// not exist.
    pub fn load(
        session_root: impl AsRef<Path>,
        session_id: &str,
    ) -> Result<Option<DebugSession>, SessionError> {
        let path = session_root.as_ref().join(session_id).join("session.json");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// List persisted session ids under a root, newest last (ids sort by
    /// their timestamp prefix).
    pub fn list_sessions(session_root: impl AsRef<Path>) -> Result<Vec<String>, SessionError> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(session_root.as_ref()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
