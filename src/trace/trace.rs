// ABOUTME: Append-only execution trace for every lock/file/agent event.
// ABOUTME: Best-effort: write failures are logged and never block the caller.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::session::AgentState;

/// One structured event in the execution trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    LockAcquired { agent_id: u32, path: String },
    LockReleased { agent_id: u32, path: String },
    LockWait { agent_id: u32, path: String, holder: Option<u32> },
    LockTimeout { agent_id: u32, path: String, waited_ms: u64 },
    StaleCleaned { path: String, age_ms: u64 },
    AgentState { agent_id: u32, state: AgentState },
    FileRead { agent_id: u32, path: String },
    FileWrite { agent_id: u32, path: String },
    DeadlockDetected { cycle: Vec<u32> },
}

impl TraceEvent {
    /// The human-readable line body, without the timestamp prefix.
    fn render(&self) -> String {
        match self {
            TraceEvent::LockAcquired { agent_id, path } => {
                format!("[lock-acquired] agent={} path={}", agent_id, path)
            }
            TraceEvent::LockReleased { agent_id, path } => {
                format!("[lock-released] agent={} path={}", agent_id, path)
            }
            TraceEvent::LockWait {
                agent_id,
                path,
                holder,
            } => match holder {
                Some(holder) => format!(
                    "[lock-wait] agent={} path={} holder={}",
                    agent_id, path, holder
                ),
                None => format!("[lock-wait] agent={} path={}", agent_id, path),
            },
            TraceEvent::LockTimeout {
                agent_id,
                path,
                waited_ms,
            } => format!(
                "[lock-timeout] agent={} path={} waited_ms={}",
                agent_id, path, waited_ms
            ),
            TraceEvent::StaleCleaned { path, age_ms } => {
                format!("[stale-cleaned] path={} age_ms={}", path, age_ms)
            }
            TraceEvent::AgentState { agent_id, state } => {
                format!("[agent-state] agent={} state={}", agent_id, state)
            }
            TraceEvent::FileRead { agent_id, path } => {
                format!("[file-read] agent={} path={}", agent_id, path)
            }
            TraceEvent::FileWrite { agent_id, path } => {
                format!("[file-write] agent={} path={}", agent_id, path)
            }
            TraceEvent::DeadlockDetected { cycle } => {
                let ids: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
                format!("[deadlock] cycle={}", ids.join("->"))
            }
        }
    }
}

/// Trait for receiving rendered trace lines.
///
/// Implement this to route the execution trace somewhere other than the
/// session's log file (an aggregator, a test collector, a socket).
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Append one rendered trace line.
    async fn append(&self, line: &str) -> Result<(), anyhow::Error>;
}

/// Sink appending to `execution-trace.log` in a session directory.
pub struct FileTraceSink {
    file: Mutex<std::fs::File>,
}

impl FileTraceSink {
    pub fn open(session_dir: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = session_dir.as_ref().join("execution-trace.log");
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl TraceSink for FileTraceSink {
    async fn append(&self, line: &str) -> Result<(), anyhow::Error> {
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

/// In-memory sink. Useful for tests and short-lived embedders that want to
/// inspect events without touching disk.
#[derive(Default)]
pub struct MemoryTraceSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new sink wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn append(&self, line: &str) -> Result<(), anyhow::Error> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }
}

/// Structured, timestamped event logger over a [`TraceSink`].
///
/// Observability must never block correctness-critical work: open and write
/// failures are downgraded to warnings and the trace silently disables
/// itself. Library embedders and tests that want no trace at all use
/// [`DebugTrace::disabled`].
pub struct DebugTrace {
    sink: Option<Arc<dyn TraceSink>>,
}

impl DebugTrace {
    /// Trace into `execution-trace.log` inside `session_dir`. Falls back
    /// to a disabled trace when the file cannot be opened.
    pub fn new(session_dir: impl AsRef<Path>) -> Self {
        match FileTraceSink::open(&session_dir) {
            Ok(sink) => Self {
                sink: Some(Arc::new(sink)),
            },
            Err(e) => {
                warn!(
                    dir = %session_dir.as_ref().display(),
                    error = %e,
                    "trace log unavailable, tracing disabled"
                );
                Self { sink: None }
            }
        }
    }

    /// Trace into a caller-provided sink.
    pub fn with_sink(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A trace that drops every event.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append one event. Failures are swallowed and logged.
    pub async fn log(&self, event: TraceEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        let line = format!(
            "[{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event.render()
        );
        if let Err(e) = sink.append(&line).await {
            warn!(error = %e, "failed to append trace event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_events_append_as_lines() {
        let dir = tempdir().unwrap();
        let trace = DebugTrace::new(dir.path());
        assert!(trace.is_enabled());

        trace
            .log(TraceEvent::LockAcquired {
                agent_id: 1,
                path: "a.txt".into(),
            })
            .await;
        trace
            .log(TraceEvent::LockTimeout {
                agent_id: 2,
                path: "a.txt".into(),
                waited_ms: 5000,
            })
            .await;

        let content = std::fs::read_to_string(dir.path().join("execution-trace.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[lock-acquired] agent=1 path=a.txt"));
        assert!(lines[1].contains("waited_ms=5000"));
    }

    #[tokio::test]
    async fn test_memory_sink_collects_events() {
        let sink = MemoryTraceSink::shared();
        let trace = DebugTrace::with_sink(sink.clone());

        trace
            .log(TraceEvent::StaleCleaned {
                path: "a.txt".into(),
                age_ms: 600_000,
            })
            .await;

        let lines = sink.lines().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[stale-cleaned] path=a.txt age_ms=600000"));
    }

    #[tokio::test]
    async fn test_disabled_trace_drops_events() {
        let trace = DebugTrace::disabled();
        assert!(!trace.is_enabled());
        trace
            .log(TraceEvent::DeadlockDetected { cycle: vec![1, 2] })
            .await;
    }

    #[test]
    fn test_deadlock_render_shows_cycle_order() {
        let event = TraceEvent::DeadlockDetected { cycle: vec![3, 1, 2] };
        assert!(event.render().contains("cycle=3->1->2"));
    }
}
