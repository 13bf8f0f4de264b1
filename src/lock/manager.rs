// ABOUTME: Lock orchestration: timeout/retry acquisition, waiting registry,
// ABOUTME: bulk stale reclamation, and wait-for-graph deadlock queries.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::deadlock::{DeadlockReport, find_cycle};
use super::primitives::{LockPrimitives, LockStatus};
use super::record::{LockMode, LockRecord};
use crate::config::CoordinationConfig;
use crate::error::LockError;

/// Orchestrates lock acquisition across agent processes.
///
/// Wraps [`LockPrimitives`] with a bounded-blocking retry loop and an
/// in-memory registry of which agents are currently waiting on which paths.
/// The registry only sees agents in *this* process; lock files on disk are
/// the cross-process truth. Waiters get no FIFO ordering: whoever wins the
/// next atomic create wins, which tolerates starvation in exchange for
/// having no queue state to corrupt.
pub struct LockManager {
    primitives: LockPrimitives,
    poll_interval: Duration,
    waiting: Mutex<HashMap<String, HashSet<u32>>>,
}

impl LockManager {
    /// Build a manager from configuration, creating the lock directory.
    pub fn new(config: &CoordinationConfig) -> Result<Self, LockError> {
        let primitives = LockPrimitives::new(&config.lock_dir, config.stale_threshold())?;
        Ok(Self {
            primitives,
            poll_interval: config.poll_interval(),
            waiting: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire an exclusive write-intent lock on `path`, waiting up to `timeout`.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the timeout
    /// elapses. Timeout is an expected outcome the caller must branch on,
    /// never an error. Not re-entrant: acquiring a path this agent already
    /// holds spins until the timeout.
    pub async fn acquire(
        &self,
        path: &str,
        agent_id: u32,
        timeout: Duration,
    ) -> Result<bool, LockError> {
        self.acquire_with_mode(path, agent_id, LockMode::Write, timeout)
            .await
    }

    /// Acquire with an explicit intent mode. Read intent is recorded in the
    /// lock record but grants the same exclusive access as write.
    pub async fn acquire_with_mode(
        &self,
        path: &str,
        agent_id: u32,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<bool, LockError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.primitives.try_acquire(path, agent_id, mode).await {
                Ok(true) => {
                    self.clear_waiting(path, agent_id).await;
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    self.clear_waiting(path, agent_id).await;
                    return Err(e);
                }
            }

            if Instant::now() >= deadline {
                self.clear_waiting(path, agent_id).await;
                debug!(path, agent_id, "lock acquisition timed out");
                return Ok(false);
            }

            self.mark_waiting(path, agent_id).await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Release a lock held by `agent_id`. Ownership violations propagate;
    /// releasing an absent lock is a no-op.
    pub async fn release(&self, path: &str, agent_id: u32) -> Result<(), LockError> {
        self.primitives.release(path, agent_id).await
    }

    /// Non-blocking lock state for a single path.
    pub async fn status(&self, path: &str) -> Result<LockStatus, LockError> {
        self.primitives.status(path).await
    }

    /// Remove every lock older than `max_age`, regardless of owner.
    ///
    /// No ownership check: an abnormally long-held lock can be preempted,
    /// so callers pick thresholds well above normal hold durations. Used by
    /// the operator-facing monitor and the background sweeper.
    pub async fn force_release_stale(&self, max_age: Duration) -> Result<usize, LockError> {
        let mut removed = 0;
        for record in self.primitives.list_all().await? {
            removed += self
                .primitives
                .clean_if_stale(&record.filepath, max_age)
                .await?;
        }
        if removed > 0 {
            info!(removed, "force-released stale locks");
        }
        Ok(removed)
    }

    /// Remove every lock unconditionally. Destructive; the caller is
    /// responsible for confirmation.
    pub async fn force_clear_all(&self) -> Result<usize, LockError> {
        let mut removed = 0;
        for record in self.primitives.list_all().await? {
            removed += self
                .primitives
                .clean_if_stale(&record.filepath, Duration::ZERO)
                .await?;
        }
        info!(removed, "force-cleared all locks");
        Ok(removed)
    }

    /// All currently readable lock records.
    pub async fn current_locks(&self) -> Result<Vec<LockRecord>, LockError> {
        self.primitives.list_all().await
    }

    /// Snapshot of agents currently blocked in `acquire`, grouped by path.
    pub async fn waiting_agents(&self) -> HashMap<String, HashSet<u32>> {
        self.waiting.lock().await.clone()
    }

    /// Build the wait-for graph from live state and look for a cycle.
    ///
    /// Purely diagnostic: reads unsynchronized waiting and holder state, so
    /// a cycle observed while a release is in flight may be transient. The
    /// manager never breaks cycles; resolution is an operator action or a
    /// waiter's own timeout.
    pub async fn detect_deadlock(&self) -> Result<DeadlockReport, LockError> {
        let waiting = self.waiting_agents().await;
        let holders: HashMap<String, u32> = self
            .primitives
            .list_all()
            .await?
            .into_iter()
            .map(|record| (record.filepath, record.agent_id))
            .collect();

        let mut deps: HashMap<u32, HashSet<u32>> = HashMap::new();
        for (path, waiters) in &waiting {
            if let Some(&holder) = holders.get(path) {
                for &waiter in waiters {
                    // A waiter blocked on its own lock forms a self-loop.
                    deps.entry(waiter).or_default().insert(holder);
                }
            }
        }

        Ok(DeadlockReport::from_cycle(find_cycle(&deps)))
    }

    async fn mark_waiting(&self, path: &str, agent_id: u32) {
        self.waiting
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .insert(agent_id);
    }

    async fn clear_waiting(&self, path: &str, agent_id: u32) {
        let mut waiting = self.waiting.lock().await;
        if let Some(waiters) = waiting.get_mut(path) {
            waiters.remove(&agent_id);
            if waiters.is_empty() {
                waiting.remove(path);
            }
        }
    }
}
