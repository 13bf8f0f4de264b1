// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use warden::prelude::*;` to get started quickly.

pub use crate::config::CoordinationConfig;
pub use crate::context::CoordinationContext;
pub use crate::error::{ExportError, LockError, SessionError, WardenError};
pub use crate::lock::{
    DeadlockReport, LockManager, LockMode, LockPrimitives, LockRecord, LockStatus, find_cycle,
    lock_file_name,
};
pub use crate::monitor::{
    LockView, Monitor, MonitorSnapshot, StressConfig, StressReport, render_markdown, run_stress,
    spawn_dashboard_writer, spawn_sweeper,
};
pub use crate::session::{
    AgentState, AgentStatus, DebugSession, FileOperation, FileOperationEvent, SessionTracker,
    StatusUpdate, TokenUsage, content_hash, hash_file,
};
pub use crate::trace::{
    ComparisonReport, DebugTrace, ExpectedOutcome, ExportFormat, FileTraceSink, Finding,
    MemoryTraceSink, ReplayCursor, SessionReport, TraceEvent, TraceSink, analyze, compare, export,
    save_snapshot,
};
