// ABOUTME: Live monitor over lock and session state, with operator actions.
// ABOUTME: Renders a colored terminal view and runs the background stale sweep.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::context::CoordinationContext;
use crate::error::LockError;
use crate::lock::{DeadlockReport, LockManager, LockRecord};
use crate::session::{AgentState, AgentStatus};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";

/// One held lock as the monitor sees it.
#[derive(Debug, Clone)]
pub struct LockView {
    pub record: LockRecord,
    pub age: Duration,
    pub stale: bool,
}

/// Point-in-time view of the whole coordination state.
///
/// Assembled from live, unsynchronized reads: locks can appear or vanish
/// between the underlying queries, which is acceptable for a diagnostic
/// surface.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub taken_at: DateTime<Utc>,
    pub locks: Vec<LockView>,
    pub waiting: BTreeMap<String, Vec<u32>>,
    pub deadlock: DeadlockReport,
    pub agents: Vec<AgentStatus>,
}

impl MonitorSnapshot {
    /// Count of agents per lifecycle state, for the summary line.
    pub fn state_counts(&self) -> BTreeMap<AgentState, usize> {
        let mut counts = BTreeMap::new();
        for agent in &self.agents {
            *counts.entry(agent.state).or_insert(0) += 1;
        }
        counts
    }
}

/// Polls the lock manager and session tracker and renders their combined
/// state. Also hosts the operator actions the dashboard binary exposes.
#[derive(Clone)]
pub struct Monitor {
    ctx: CoordinationContext,
    stale_threshold: Duration,
}

impl Monitor {
    pub fn new(ctx: CoordinationContext) -> Self {
        let stale_threshold = ctx.config().stale_threshold();
        Self {
            ctx,
            stale_threshold,
        }
    }

    /// Gather one snapshot of locks, waiters, deadlock state, and agents.
    pub async fn poll(&self) -> Result<MonitorSnapshot, LockError> {
        let manager = self.ctx.lock_manager();
        let records = manager.current_locks().await?;
        let deadlock = manager.detect_deadlock().await?;

        let mut locks: Vec<LockView> = records
            .into_iter()
            .map(|record| {
                let age = record.age();
                LockView {
                    stale: age > self.stale_threshold,
                    age,
                    record,
                }
            })
            .collect();
        locks.sort_by(|a, b| a.record.filepath.cmp(&b.record.filepath));

        let mut waiting = BTreeMap::new();
        for (path, agents) in manager.waiting_agents().await {
            let mut agents: Vec<u32> = agents.into_iter().collect();
            agents.sort_unstable();
            waiting.insert(path, agents);
        }

        Ok(MonitorSnapshot {
            taken_at: Utc::now(),
            locks,
            waiting,
            deadlock,
            agents: self.ctx.tracker().snapshot().await.agents,
        })
    }

    /// Render the snapshot as a colored terminal view.
    pub fn render(&self, snapshot: &MonitorSnapshot) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{}warden monitor{} {}{}{}\n\n",
            BOLD,
            RESET,
            DIM,
            snapshot.taken_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            RESET
        ));

        out.push_str(&format!("{}Active locks ({}){}\n", BOLD, snapshot.locks.len(), RESET));
        if snapshot.locks.is_empty() {
            out.push_str(&format!("  {}none{}\n", DIM, RESET));
        }
        for view in &snapshot.locks {
            let flag = if view.stale {
                format!(" {}[STALE]{}", YELLOW, RESET)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "  {}  agent={}  mode={}  age={}{}\n",
                view.record.filepath,
                view.record.agent_id,
                view.record.operation,
                format_age(view.age),
                flag
            ));
        }

        out.push_str(&format!("\n{}Waiting agents{}\n", BOLD, RESET));
        if snapshot.waiting.is_empty() {
            out.push_str(&format!("  {}none{}\n", DIM, RESET));
        }
        for (path, agents) in &snapshot.waiting {
            let ids: Vec<String> = agents.iter().map(|id| id.to_string()).collect();
            out.push_str(&format!("  {}  <-  agents {}\n", path, ids.join(", ")));
        }

        out.push('\n');
        if snapshot.deadlock.has_cycle {
            let ids: Vec<String> = snapshot.deadlock.cycle.iter().map(|id| id.to_string()).collect();
            out.push_str(&format!(
                "{}{}DEADLOCK: {} -> {}{}\n",
                BOLD,
                RED,
                ids.join(" -> "),
                ids[0],
                RESET
            ));
        } else {
            out.push_str(&format!("{}Deadlock: none{}\n", GREEN, RESET));
        }

        if !snapshot.agents.is_empty() {
            let summary: Vec<String> = snapshot
                .state_counts()
                .into_iter()
                .map(|(state, count)| format!("{} {}", count, state))
                .collect();
            out.push_str(&format!("\n{}Agents:{} {}\n", BOLD, RESET, summary.join(", ")));
        }

        out
    }

    /// Operator action: remove locks older than the configured threshold.
    pub async fn clean_stale(&self) -> Result<usize, LockError> {
        self.ctx
            .lock_manager()
            .force_release_stale(self.stale_threshold)
            .await
    }

    /// Operator action: remove every lock. The caller gates confirmation.
    pub async fn force_clear_all(&self) -> Result<usize, LockError> {
        self.ctx.lock_manager().force_clear_all().await
    }

    pub fn context(&self) -> &CoordinationContext {
        &self.ctx
    }
}

/// Detached self-healing sweep: periodically reclaims locks abandoned by
/// crashed agents, independent of any operator interaction. Runs until the
/// handle is aborted.
pub fn spawn_sweeper(
    manager: Arc<LockManager>,
    interval: Duration,
    threshold: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh start
        // doesn't sweep before anything could go stale.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = manager.force_release_stale(threshold).await {
                warn!(error = %e, "background stale sweep failed");
            }
        }
    })
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}
