// ABOUTME: Contention stress harness: N agents x M lock-guarded counter increments.
// ABOUTME: Timeouts and detected deadlocks are countable outcomes, not failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::CoordinationContext;
use crate::error::WardenError;
use crate::session::{
    AgentState, FileOperation, FileOperationEvent, StatusUpdate, content_hash,
};
use crate::trace::TraceEvent;

/// Parameters for one stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub agents: u32,
    pub ops_per_agent: u32,
    pub timeout: Duration,
    /// Artificial hold time between the read and the write of each cycle,
    /// inflating the contention window.
    pub hold: Duration,
    /// The shared counter file every agent increments.
    pub counter_file: PathBuf,
}

impl StressConfig {
    pub fn new(counter_file: impl Into<PathBuf>) -> Self {
        Self {
            agents: 10,
            ops_per_agent: 5,
            timeout: Duration::from_secs(5),
            hold: Duration::from_millis(10),
            counter_file: counter_file.into(),
        }
    }

    pub fn attempted(&self) -> u64 {
        u64::from(self.agents) * u64::from(self.ops_per_agent)
    }
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressReport {
    pub attempted: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub deadlock_detected: bool,
    pub final_counter: u64,
    pub elapsed_ms: u64,
    pub ops_per_sec: f64,
}

impl StressReport {
    /// A run fails only when operations were lost (succeeded + timed out
    /// does not account for every attempt, or the counter disagrees with
    /// the success count) or an unexpected deadlock appeared.
    pub fn is_success(&self) -> bool {
        self.succeeded + self.timed_out == self.attempted
            && self.final_counter == self.succeeded
            && !self.deadlock_detected
    }
}

/// Run the contention harness: every agent performs `ops_per_agent`
/// lock-guarded read-increment-write cycles against the shared counter.
///
/// Agents here are tokio tasks rather than separate OS processes, but they
/// coordinate through the same lock files a multi-process deployment
/// would, so the mutual-exclusion path under test is identical.
pub async fn run_stress(
    ctx: &CoordinationContext,
    config: &StressConfig,
) -> Result<StressReport, WardenError> {
    let counter_path = config
        .counter_file
        .to_str()
        .map(str::to_string)
        .unwrap_or_else(|| config.counter_file.display().to_string());
    std::fs::write(&config.counter_file, "0").map_err(crate::error::LockError::from)?;

    for agent_id in 1..=config.agents {
        ctx.tracker().register(agent_id, agent_id - 1).await;
    }

    let done = Arc::new(AtomicBool::new(false));
    let deadlock_seen = Arc::new(AtomicBool::new(false));
    let checker = {
        let ctx = ctx.clone();
        let done = done.clone();
        let deadlock_seen = deadlock_seen.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::Relaxed) {
                if let Ok(report) = ctx.lock_manager().detect_deadlock().await {
                    if report.has_cycle {
                        deadlock_seen.store(true, Ordering::Relaxed);
                        ctx.trace()
                            .log(TraceEvent::DeadlockDetected {
                                cycle: report.cycle,
                            })
                            .await;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    let start = Instant::now();
    let mut tasks = Vec::new();
    for agent_id in 1..=config.agents {
        let ctx = ctx.clone();
        let config = config.clone();
        let counter_path = counter_path.clone();
        tasks.push(tokio::spawn(async move {
            run_agent(&ctx, &config, &counter_path, agent_id).await
        }));
    }

    let mut succeeded = 0u64;
    let mut timed_out = 0u64;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok((ok, missed))) => {
                succeeded += ok;
                timed_out += missed;
            }
            Ok(Err(e)) => return Err(e),
            // A panicked agent task counts its operations as lost, which
            // is_success surfaces as a failed run.
            Err(_) => {}
        }
    }
    let elapsed = start.elapsed();

    done.store(true, Ordering::Relaxed);
    let _ = checker.await;

    let final_counter = std::fs::read_to_string(&config.counter_file)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    ctx.tracker().finish().await;
    ctx.tracker().persist().await?;

    let report = StressReport {
        attempted: config.attempted(),
        succeeded,
        timed_out,
        deadlock_detected: deadlock_seen.load(Ordering::Relaxed),
        final_counter,
        elapsed_ms: elapsed.as_millis() as u64,
        ops_per_sec: if elapsed.as_secs_f64() > 0.0 {
            succeeded as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        },
    };
    info!(
        succeeded = report.succeeded,
        timed_out = report.timed_out,
        final_counter = report.final_counter,
        "stress run finished"
    );
    Ok(report)
}

/// One agent's share of the run. Returns (succeeded, timed_out).
async fn run_agent(
    ctx: &CoordinationContext,
    config: &StressConfig,
    counter_path: &str,
    agent_id: u32,
) -> Result<(u64, u64), WardenError> {
    let manager = ctx.lock_manager();
    let tracker = ctx.tracker();
    let trace = ctx.trace();

    tracker
        .update_status(agent_id, StatusUpdate::state(AgentState::Running))
        .await?;

    let mut succeeded = 0u64;
    let mut timed_out = 0u64;

    for _ in 0..config.ops_per_agent {
        tracker
            .update_status(
                agent_id,
                StatusUpdate::state(AgentState::Waiting).with_operation("acquire counter lock"),
            )
            .await?;
        trace
            .log(TraceEvent::LockWait {
                agent_id,
                path: counter_path.to_string(),
                holder: None,
            })
            .await;

        let wait_start = Instant::now();
        let acquired = manager
            .acquire(counter_path, agent_id, config.timeout)
            .await?;
        let waited_ms = wait_start.elapsed().as_millis() as u64;

        if !acquired {
            timed_out += 1;
            trace
                .log(TraceEvent::LockTimeout {
                    agent_id,
                    path: counter_path.to_string(),
                    waited_ms,
                })
                .await;
            tracker
                .record_operation(
                    FileOperationEvent::new(agent_id, FileOperation::Lock, counter_path)
                        .with_duration(waited_ms)
                        .failed(),
                )
                .await;
            tracker
                .update_status(agent_id, StatusUpdate::state(AgentState::Running))
                .await?;
            continue;
        }

        trace
            .log(TraceEvent::LockAcquired {
                agent_id,
                path: counter_path.to_string(),
            })
            .await;
        tracker
            .record_operation(
                FileOperationEvent::new(agent_id, FileOperation::Lock, counter_path)
                    .with_duration(waited_ms),
            )
            .await;
        tracker
            .update_status(agent_id, StatusUpdate::state(AgentState::Running))
            .await?;

        let before = std::fs::read_to_string(counter_path).map_err(crate::error::LockError::from)?;
        let value: u64 = before.trim().parse().unwrap_or(0);
        trace
            .log(TraceEvent::FileRead {
                agent_id,
                path: counter_path.to_string(),
            })
            .await;
        tracker
            .record_operation(FileOperationEvent::new(agent_id, FileOperation::Read, counter_path))
            .await;

        tokio::time::sleep(config.hold).await;

        let after = (value + 1).to_string();
        std::fs::write(counter_path, &after).map_err(crate::error::LockError::from)?;
        trace
            .log(TraceEvent::FileWrite {
                agent_id,
                path: counter_path.to_string(),
            })
            .await;
        tracker
            .record_operation(
                FileOperationEvent::new(agent_id, FileOperation::Write, counter_path)
                    .with_hashes(Some(content_hash(before.as_bytes())), Some(content_hash(after.as_bytes()))),
            )
            .await;
        tracker
            .update_status(
                agent_id,
                StatusUpdate::default().with_file_modified(counter_path),
            )
            .await?;

        manager.release(counter_path, agent_id).await?;
        trace
            .log(TraceEvent::LockReleased {
                agent_id,
                path: counter_path.to_string(),
            })
            .await;
        tracker
            .record_operation(FileOperationEvent::new(agent_id, FileOperation::Unlock, counter_path))
            .await;

        succeeded += 1;
    }

    tracker
        .update_status(agent_id, StatusUpdate::state(AgentState::Complete))
        .await?;
    trace
        .log(TraceEvent::AgentState {
            agent_id,
            state: AgentState::Complete,
        })
        .await;

    Ok((succeeded, timed_out))
}
