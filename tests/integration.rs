// ABOUTME: Integration tests verifying the coordination properties end-to-end.
// ABOUTME: Exercises locking, staleness, deadlock, and contention through the prelude.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::tempdir;

use warden::prelude::*;

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
async fn test_mutual_exclusion_under_racing_acquires() {
    let dir = tempdir().unwrap();
    let mgr = Arc::new(LockManager::new(&fast_config(&dir)).unwrap());

    // Ten agents race a single non-blocking acquire; exactly one may win.
    let mut handles = Vec::new();
    for agent_id in 1..=10u32 {
        let mgr = mgr.clone();
        handles.push(tokio::spawn(async move {
            mgr.acquire("shared.txt", agent_id, Duration::ZERO).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one agent may hold the lock");
    assert_eq!(mgr.current_locks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sequential_fairness_example() {
    // Agent 1 takes package.json first; agent 2 arrives 100ms later with a
    // 5000ms timeout; agent 1 holds for 1000ms. Both must succeed, agent 1
    // strictly first.
    let dir = tempdir().unwrap();
    let mgr = Arc::new(LockManager::new(&fast_config(&dir)).unwrap());

    assert!(
        mgr.acquire("package.json", 1, Duration::from_secs(5))
            .await
            .unwrap()
    );

    let second = {
        let mgr = mgr.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            mgr.acquire("package.json", 2, Duration::from_millis(5000))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1000)).await;
    // Agent 2 must still be blocked while agent 1 holds.
    assert!(!second.is_finished());
    mgr.release("package.json", 1).await.unwrap();

    assert!(second.await.unwrap().unwrap());
    assert_eq!(
        mgr.status("package.json").await.unwrap().owner_id,
        Some(2)
    );
}

#[tokio::test]
async fn test_stale_reclamation_after_simulated_crash() {
    let dir = tempdir().unwrap();
    let config = fast_config(&dir);

    // Agent 1 acquired src/index.ts and never released.
    plant_aged_lock(&config, "src/index.ts", 1, 600);

    let mgr = LockManager::new(&config).unwrap();
    let removed = mgr
        .force_release_stale(Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(
        mgr.acquire("src/index.ts", 2, Duration::from_millis(500))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_three_agent_deadlock_cycle_is_reported() {
    let dir = tempdir().unwrap();
    let mgr = Arc::new(LockManager::new(&fast_config(&dir)).unwrap());

    mgr.acquire("file-a", 1, Duration::from_millis(100)).await.unwrap();
    mgr.acquire("file-b", 2, Duration::from_millis(100)).await.unwrap();
    mgr.acquire("file-c", 3, Duration::from_millis(100)).await.unwrap();

    let mut waiters = Vec::new();
    for (agent, path) in [(1u32, "file-b"), (2, "file-c"), (3, "file-a")] {
        let mgr = mgr.clone();
        waiters.push(tokio::spawn(async move {
            mgr.acquire(path, agent, Duration::from_millis(800)).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let report = mgr.detect_deadlock().await.unwrap();
    assert!(report.has_cycle);
    let members: HashSet<u32> = report.cycle.iter().copied().collect();
    assert_eq!(members, HashSet::from([1, 2, 3]));

    // Timeout-driven self-resolution: every waiter gives up on its own.
    for handle in waiters {
        assert!(!handle.await.unwrap().unwrap());
    }
    let report = mgr.detect_deadlock().await.unwrap();
    assert!(!report.has_cycle);
}

#[tokio::test]
async fn test_ownership_enforcement() {
    let dir = tempdir().unwrap();
    let mgr = LockManager::new(&fast_config(&dir)).unwrap();

    mgr.acquire("guarded.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let err = mgr.release("guarded.txt", 2).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwner { owner_id: 1, .. }));

    // The lock is untouched.
    assert_eq!(mgr.status("guarded.txt").await.unwrap().owner_id, Some(1));
}

#[tokio::test]
async fn test_no_corruption_under_contention() {
    // 10 agents x 5 guarded increments: the counter must land on exactly 50
    // and the operation log must carry exactly 50 write entries.
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::new(fast_config(&dir)).unwrap();

    let stress = StressConfig {
        agents: 10,
        ops_per_agent: 5,
        timeout: Duration::from_secs(30),
        hold: Duration::from_millis(1),
        counter_file: dir.path().join("counter.txt"),
    };

    let report = run_stress(&ctx, &stress).await.unwrap();
    assert!(report.is_success(), "report: {:?}", report);
    assert_eq!(report.final_counter, 50);

    let counter: u64 = std::fs::read_to_string(dir.path().join("counter.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(counter, 50);

    let session = ctx.tracker().snapshot().await;
    let writes = session
        .operations
        .iter()
        .filter(|op| op.operation == FileOperation::Write)
        .count();
    assert_eq!(writes, 50);

    // The persisted session reloads identically for post-mortem tooling.
    let loaded = SessionTracker::load(&ctx.config().session_root, ctx.tracker().session_id())
        .unwrap()
        .unwrap();
    assert_eq!(loaded.operations.len(), session.operations.len());

    // And the trace log observed the run.
    let trace = std::fs::read_to_string(ctx.tracker().session_dir().join("execution-trace.log"))
        .unwrap();
    assert!(trace.lines().count() >= 50);
}

#[tokio::test]
async fn test_timeout_returns_false_and_leaves_no_orphan() {
    let dir = tempdir().unwrap();
    let config = fast_config(&dir);
    let mgr = LockManager::new(&config).unwrap();

    mgr.acquire("held.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let acquired = mgr
        .acquire("held.txt", 2, Duration::from_millis(150))
        .await
        .unwrap();
    assert!(!acquired);

    // Exactly the original lock file remains, still owned by agent 1.
    let locks = mgr.current_locks().await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].agent_id, 1);

    let entries: Vec<_> = std::fs::read_dir(&config.lock_dir)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_liveness_after_release() {
    let dir = tempdir().unwrap();
    let mgr = Arc::new(LockManager::new(&fast_config(&dir)).unwrap());

    mgr.acquire("hot.txt", 1, Duration::from_millis(100))
        .await
        .unwrap();

    let contender = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.acquire("hot.txt", 2, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let released_at = std::time::Instant::now();
    mgr.release("hot.txt", 1).await.unwrap();
    assert!(contender.await.unwrap().unwrap());

    // The waiter succeeded within a couple of poll intervals of the release.
    assert!(released_at.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_analysis_pipeline_over_real_run() {
    let dir = tempdir().unwrap();
    let ctx = CoordinationContext::new(fast_config(&dir)).unwrap();

    let stress = StressConfig {
        agents: 3,
        ops_per_agent: 2,
        timeout: Duration::from_secs(10),
        hold: Duration::from_millis(1),
        counter_file: dir.path().join("counter.txt"),
    };
    run_stress(&ctx, &stress).await.unwrap();

    let session = SessionTracker::load(&ctx.config().session_root, ctx.tracker().session_id())
        .unwrap()
        .unwrap();

    let report = analyze(&session, None);
    assert_eq!(report.operations.writes, 6);
    assert_eq!(report.agents.len(), 3);
    assert!(report.agents.iter().all(|a| a.state == AgentState::Complete));

    let out = dir.path().join("export.csv");
    export(&session, ExportFormat::Csv, &out, None).unwrap();
    let csv = std::fs::read_to_string(&out).unwrap();
    // Header plus one row per logged operation.
    assert_eq!(csv.lines().count(), session.operations.len() + 1);
}
