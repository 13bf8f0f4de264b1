// ABOUTME: CoordinationContext - explicit aggregate of the per-run collaborators.
// ABOUTME: Replaces process-wide singletons; cheap to clone, one per run.

use std::sync::Arc;

use crate::config::CoordinationConfig;
use crate::error::WardenError;
use crate::lock::LockManager;
use crate::session::SessionTracker;
use crate::trace::DebugTrace;

/// Everything a component needs to participate in one coordinated run:
/// the lock manager, the session tracker, and the debug trace, bound to a
/// single configuration.
///
/// Components receive this explicitly instead of reaching for globals, so
/// tests and embedders can run several isolated contexts in one process.
#[derive(Clone)]
pub struct CoordinationContext {
    config: CoordinationConfig,
    lock_manager: Arc<LockManager>,
    tracker: Arc<SessionTracker>,
    trace: Arc<DebugTrace>,
}

impl CoordinationContext {
    /// Create a context with a fresh session and an enabled trace log.
    pub fn new(config: CoordinationConfig) -> Result<Self, WardenError> {
        let lock_manager = Arc::new(LockManager::new(&config)?);
        let tracker = Arc::new(SessionTracker::new(config.clone())?);
        let trace = Arc::new(DebugTrace::new(tracker.session_dir()));
        Ok(Self {
            config,
            lock_manager,
            tracker,
            trace,
        })
    }

    /// Create a context that drops trace events, for embedders that only
    /// want locking and tracking.
    pub fn without_trace(config: CoordinationConfig) -> Result<Self, WardenError> {
        let lock_manager = Arc::new(LockManager::new(&config)?);
        let tracker = Arc::new(SessionTracker::new(config.clone())?);
        Ok(Self {
            config,
            lock_manager,
            tracker,
            trace: Arc::new(DebugTrace::disabled()),
        })
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    pub fn trace(&self) -> &Arc<DebugTrace> {
        &self.trace
    }
}
