// ABOUTME: Defines all error types for the warden library using thiserror.
// ABOUTME: Each submodule has its own error enum, unified under WardenError.

/// Top-level error type for the warden library.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Errors from lock operations.
///
/// Lock conflicts and acquisition timeouts are not errors: `try_acquire`
/// and `acquire` report them through their `bool` return value. Only
/// ownership violations and real filesystem failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("agent {requester_id} does not own lock on '{path}' (held by agent {owner_id})")]
    NotOwner {
        path: String,
        owner_id: u32,
        requester_id: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock record error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from session tracking and persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown agent {0} (not registered in this session)")]
    UnknownAgent(u32),

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from session export and comparison.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
