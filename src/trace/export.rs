// ABOUTME: Post-mortem tooling over persisted sessions: analysis, export,
// ABOUTME: labeled snapshots, expected-outcome comparison, and replay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::session::{
    AgentState, DebugSession, FileOperation, FileOperationEvent, TokenUsage, hash_file,
};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Outcome of one agent, summarized for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent_id: u32,
    pub state: AgentState,
    pub tokens_used: u64,
    pub files_modified: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Operation totals by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationCounts {
    pub reads: usize,
    pub writes: usize,
    pub locks: usize,
    pub unlocks: usize,
    pub failures: usize,
}

/// A path ranked by how much lock time agents spent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentionEntry {
    pub path: String,
    pub lock_count: usize,
    pub total_lock_ms: u64,
}

/// A concrete analysis finding. Tagged by kind so consumers can branch on
/// the variant instead of probing loose JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Finding {
    /// An agent spent a disproportionate share of the run inside lock
    /// acquisition.
    AgentBottleneck { agent_id: u32, total_lock_ms: u64 },
    /// A path accounts for a large share of all lock time.
    HotPath { path: String, total_lock_ms: u64 },
    /// An agent ended in the failed state.
    FailedAgent {
        agent_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Summarized report over one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub agents: Vec<AgentOutcome>,
    pub operations: OperationCounts,
    pub contention: Vec<ContentionEntry>,
    pub findings: Vec<Finding>,
    pub token_usage: TokenUsage,
}

/// Share of total lock time above which a single path or agent is flagged.
const BOTTLENECK_SHARE: f64 = 0.5;

/// Summarize a session, optionally narrowing the operation log to paths
/// matching `filter`.
pub fn analyze(session: &DebugSession, filter: Option<&Regex>) -> SessionReport {
    let operations = filtered(session, filter);

    let mut counts = OperationCounts::default();
    let mut lock_ms_by_path: HashMap<&str, (usize, u64)> = HashMap::new();
    let mut lock_ms_by_agent: HashMap<u32, u64> = HashMap::new();
    let mut total_lock_ms = 0u64;

    for op in &operations {
        match op.operation {
            FileOperation::Read => counts.reads += 1,
            FileOperation::Write => counts.writes += 1,
            FileOperation::Lock => counts.locks += 1,
            FileOperation::Unlock => counts.unlocks += 1,
        }
        if !op.success {
            counts.failures += 1;
        }
        if op.operation == FileOperation::Lock {
            let entry = lock_ms_by_path.entry(op.path.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += op.duration_ms;
            *lock_ms_by_agent.entry(op.agent_id).or_insert(0) += op.duration_ms;
            total_lock_ms += op.duration_ms;
        }
    }

    let mut contention: Vec<ContentionEntry> = lock_ms_by_path
        .into_iter()
        .map(|(path, (lock_count, total_lock_ms))| ContentionEntry {
            path: path.to_string(),
            lock_count,
            total_lock_ms,
        })
        .collect();
    contention.sort_by(|a, b| {
        b.total_lock_ms
            .cmp(&a.total_lock_ms)
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut findings = Vec::new();
    if total_lock_ms > 0 {
        let mut agents: Vec<(u32, u64)> = lock_ms_by_agent.into_iter().collect();
        agents.sort_unstable();
        for (agent_id, ms) in agents {
            if ms as f64 > total_lock_ms as f64 * BOTTLENECK_SHARE {
                findings.push(Finding::AgentBottleneck {
                    agent_id,
                    total_lock_ms: ms,
                });
            }
        }
        for entry in &contention {
            if entry.total_lock_ms as f64 > total_lock_ms as f64 * BOTTLENECK_SHARE {
                findings.push(Finding::HotPath {
                    path: entry.path.clone(),
                    total_lock_ms: entry.total_lock_ms,
                });
            }
        }
    }
    for agent in &session.agents {
        if agent.state == AgentState::Failed {
            findings.push(Finding::FailedAgent {
                agent_id: agent.id,
                error: agent.error.clone(),
            });
        }
    }

    let duration_ms = session.ended_at.map(|ended| {
        ended
            .signed_duration_since(session.started_at)
            .num_milliseconds()
            .max(0) as u64
    });

    SessionReport {
        session_id: session.session_id.clone(),
        duration_ms,
        agents: session
            .agents
            .iter()
            .map(|a| AgentOutcome {
                agent_id: a.id,
                state: a.state,
                tokens_used: a.tokens_used,
                files_modified: a.files_modified.len(),
                error: a.error.clone(),
            })
            .collect(),
        operations: counts,
        contention,
        findings,
        token_usage: session.token_usage.clone(),
    }
}

/// Export a session's operation log to `out` in the given format.
/// Returns the written path.
pub fn export(
    session: &DebugSession,
    format: ExportFormat,
    out: impl AsRef<Path>,
    filter: Option<&Regex>,
) -> Result<PathBuf, ExportError> {
    let out = out.as_ref().to_path_buf();
    let operations = filtered(session, filter);
    match format {
        ExportFormat::Json => {
            let payload = serde_json::json!({
                "sessionId": session.session_id,
                "agents": session.agents,
                "operations": operations,
                "tokenUsage": session.token_usage,
            });
            std::fs::write(&out, serde_json::to_string_pretty(&payload)?)?;
        }
        ExportFormat::Csv => {
            let mut csv =
                String::from("timestamp,agentId,operation,path,success,durationMs,beforeHash,afterHash\n");
            for op in &operations {
                let row = [
                    op.timestamp.to_rfc3339(),
                    op.agent_id.to_string(),
                    op.operation.to_string(),
                    op.path.clone(),
                    op.success.to_string(),
                    op.duration_ms.to_string(),
                    op.before_hash.clone().unwrap_or_default(),
                    op.after_hash.clone().unwrap_or_default(),
                ];
                let escaped: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
                csv.push_str(&escaped.join(","));
                csv.push('\n');
            }
            std::fs::write(&out, csv)?;
        }
    }
    Ok(out)
}

/// Save a labeled snapshot of the session next to its other artifacts.
pub fn save_snapshot(
    session: &DebugSession,
    session_dir: impl AsRef<Path>,
    label: &str,
) -> Result<PathBuf, ExportError> {
    let safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let path = session_dir.as_ref().join(format!("snapshot-{}.json", safe));
    std::fs::write(&path, serde_json::to_string_pretty(session)?)?;
    Ok(path)
}

/// Expected end state of a run, loaded from an operator-supplied JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedOutcome {
    /// Expected final lifecycle state per agent id.
    #[serde(default)]
    pub agents: HashMap<u32, AgentState>,
    /// Expected content hash per file path.
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl ExpectedOutcome {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMismatch {
    pub agent_id: u32,
    pub expected: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<AgentState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMismatch {
    pub path: String,
    pub expected_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<String>,
}

/// Result of comparing a session against an expected outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub matches: bool,
    pub agent_mismatches: Vec<AgentMismatch>,
    pub file_mismatches: Vec<FileMismatch>,
}

/// Compare actual per-agent completion states and per-file content hashes
/// against an expected outcome.
///
/// The actual hash for a file is the last recorded `afterHash` for a write
/// to that path; when the log carries none, the file on disk is hashed
/// directly.
pub fn compare(session: &DebugSession, expected: &ExpectedOutcome) -> ComparisonReport {
    let mut agent_mismatches = Vec::new();
    for (&agent_id, &want) in &expected.agents {
        let actual = session
            .agents
            .iter()
            .find(|a| a.id == agent_id)
            .map(|a| a.state);
        if actual != Some(want) {
            agent_mismatches.push(AgentMismatch {
                agent_id,
                expected: want,
                actual,
            });
        }
    }
    agent_mismatches.sort_by_key(|m| m.agent_id);

    let mut file_mismatches = Vec::new();
    for (path, want) in &expected.files {
        let logged = session
            .operations
            .iter()
            .rev()
            .find(|op| op.operation == FileOperation::Write && &op.path == path)
            .and_then(|op| op.after_hash.clone());
        let actual = logged.or_else(|| hash_file(path));
        if actual.as_deref() != Some(want.as_str()) {
            file_mismatches.push(FileMismatch {
                path: path.clone(),
                expected_hash: want.clone(),
                actual_hash: actual,
            });
        }
    }
    file_mismatches.sort_by(|a, b| a.path.cmp(&b.path));

    ComparisonReport {
        matches: agent_mismatches.is_empty() && file_mismatches.is_empty(),
        agent_mismatches,
        file_mismatches,
    }
}

/// Step-by-step cursor over a session's operation log, for interactive
/// replay. Keeps a running per-agent tally as it advances.
pub struct ReplayCursor<'a> {
    operations: &'a [FileOperationEvent],
    position: usize,
    by_agent: HashMap<u32, usize>,
}

impl<'a> ReplayCursor<'a> {
    pub fn new(session: &'a DebugSession) -> Self {
        Self {
            operations: &session.operations,
            position: 0,
            by_agent: HashMap::new(),
        }
    }

    /// Advance one operation; `None` once the log is exhausted.
    pub fn step(&mut self) -> Option<&'a FileOperationEvent> {
        let op = self.operations.get(self.position)?;
        self.position += 1;
        *self.by_agent.entry(op.agent_id).or_insert(0) += 1;
        Some(op)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations replayed so far, per agent.
    pub fn tally(&self) -> &HashMap<u32, usize> {
        &self.by_agent
    }
}

fn filtered(session: &DebugSession, filter: Option<&Regex>) -> Vec<FileOperationEvent> {
    match filter {
        Some(re) => session
            .operations
            .iter()
            .filter(|op| re.is_match(&op.path))
            .cloned()
            .collect(),
        None => session.operations.clone(),
    }
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
