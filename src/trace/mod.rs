// ABOUTME: Trace module - structured event logging and post-mortem tooling.
// ABOUTME: Contains the append-only trace writer and export/replay/compare.

mod export;
mod trace;

pub use export::{
    AgentMismatch, AgentOutcome, ComparisonReport, ContentionEntry, ExpectedOutcome, ExportFormat,
    FileMismatch, Finding, OperationCounts, ReplayCursor, SessionReport, analyze, compare, export,
    save_snapshot,
};
pub use trace::{DebugTrace, FileTraceSink, MemoryTraceSink, TraceEvent, TraceSink};
