// ABOUTME: Tests for monitor polling, rendering, sweeper, and stress harness.
// ABOUTME: Uses small agent counts and short intervals to stay fast.

use super::monitor::{Monitor, spawn_sweeper};
use super::stress::{StressConfig, run_stress};
use super::render_markdown;
use crate::config::CoordinationConfig;
use crate::context::CoordinationContext;
use crate::lock::{LockMode, LockRecord, lock_file_name};
use crate::session::{AgentState, FileOperation};

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tempfile::tempdir;

fn fast_config(dir: &tempfile::TempDir) -> CoordinationConfig {
    CoordinationConfig {
        poll_interval_ms: 10,
        ..CoordinationConfig::rooted_at(dir.path())
    }
}

fn plant_aged_lock(config: &CoordinationConfig, path: &str, agent_id: u32, age_secs: i64) {
    let mut record = LockRecord::new(path, agent_id, LockMode::Write);
    record.timestamp = Utc::now() - ChronoDuration::seconds(age_secs);
    std::fs::create_dir_all(&config.lock_dir).unwrap();
    std::fs::write(
        config.lock_dir.join(lock_file_name(path)),
        serde_json::to_string(&record).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_poll_reports_locks_and_staleness() {
    let dir = tempdir().unwrap();
    let config = fast_config(&dir);
    plant_aged_lock(&config, "old.txt", 9, 600);

    let ctx = CoordinationContext::without_trace(config).unwrap();
    ctx.lock_manager()
        .acquire("fresh.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let monitor = Monitor::new(ctx);
    let snapshot = monitor.poll().await.unwrap();

    assert_eq!(snapshot.locks.len(), 2);
    let old = snapshot
        .locks
        .iter()
        .find(|v| v.record.filepath == "old.txt")
        .unwrap();
    let fresh = snapshot
        .locks
        .iter()
        .find(|v| v.record.filepath == "fresh.txt")
        .unwrap();
    assert!(old.stale);
    assert!(!fresh.stale);
    assert!(!snapshot.deadlock.has_cycle);
}

#[tokio::test]
async fn test_render_mentions_locks_waiters_and_deadlock_state() {
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::without_trace(fast_config(&dir)).unwrap();
    let monitor = Monitor::new(ctx.clone());

    ctx.lock_manager()
        .acquire("a.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let blocked = {
        let mgr = ctx.lock_manager().clone();
        tokio::spawn(async move { mgr.acquire("a.txt", 2, Duration::from_millis(300)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = monitor.poll().await.unwrap();
    let text = monitor.render(&snapshot);

    assert!(text.contains("a.txt"));
    assert!(text.contains("agent=1"));
    assert!(text.contains("agents 2"));
    assert!(text.contains("Deadlock: none"));

    blocked.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_markdown_dashboard_contains_tables() {
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::without_trace(fast_config(&dir)).unwrap();
    ctx.lock_manager()
        .acquire("a.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();
    ctx.tracker().register(1, 0).await;

    let monitor = Monitor::new(ctx);
    let snapshot = monitor.poll().await.unwrap();
    let markdown = render_markdown(&snapshot);

    assert!(markdown.starts_with("# Coordination dashboard"));
    assert!(markdown.contains("| a.txt | 1 | write |"));
    assert!(markdown.contains("## Agents"));
}

#[tokio::test]
async fn test_clean_stale_removes_only_stale() {
    let dir = tempdir().unwrap();
    let config = fast_config(&dir);
    plant_aged_lock(&config, "old.txt", 9, 600);

    let ctx = CoordinationContext::without_trace(config).unwrap();
    ctx.lock_manager()
        .acquire("fresh.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let monitor = Monitor::new(ctx);
    assert_eq!(monitor.clean_stale().await.unwrap(), 1);

    let snapshot = monitor.poll().await.unwrap();
    assert_eq!(snapshot.locks.len(), 1);
    assert_eq!(snapshot.locks[0].record.filepath, "fresh.txt");
}

#[tokio::test]
async fn test_force_clear_all_empties_lock_dir() {
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::without_trace(fast_config(&dir)).unwrap();
    ctx.lock_manager()
        .acquire("a.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();
    ctx.lock_manager()
        .acquire("b.txt", 2, Duration::from_millis(100))
        .await
        .unwrap();

    let monitor = Monitor::new(ctx);
    assert_eq!(monitor.force_clear_all().await.unwrap(), 2);
    assert!(monitor.poll().await.unwrap().locks.is_empty());
}

#[tokio::test]
async fn test_sweeper_reclaims_abandoned_lock() {
    let dir = tempdir().unwrap();
    let config = fast_config(&dir);
    plant_aged_lock(&config, "abandoned.txt", 9, 600);

    let ctx = CoordinationContext::without_trace(config).unwrap();
    let handle = spawn_sweeper(
        ctx.lock_manager().clone(),
        Duration::from_millis(50),
        Duration::from_secs(300),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    let status = ctx.lock_manager().status("abandoned.txt").await.unwrap();
    assert!(!status.locked);
}

#[tokio::test]
async fn test_stress_run_preserves_every_increment() {
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::without_trace(fast_config(&dir)).unwrap();

    let config = StressConfig {
        agents: 4,
        ops_per_agent: 3,
        timeout: Duration::from_secs(10),
        hold: Duration::from_millis(1),
        counter_file: dir.path().join("counter.txt"),
    };

    let report = run_stress(&ctx, &config).await.unwrap();

    assert!(report.is_success(), "report: {:?}", report);
    assert_eq!(report.succeeded, 12);
    assert_eq!(report.final_counter, 12);
    assert_eq!(report.timed_out, 0);

    // One write entry per guarded cycle.
    let snapshot = ctx.tracker().snapshot().await;
    let writes = snapshot
        .operations
        .iter()
        .filter(|op| op.operation == FileOperation::Write)
        .count();
    assert_eq!(writes, 12);
    assert!(
        snapshot
            .agents
            .iter()
            .all(|a| a.state == AgentState::Complete)
    );
}
