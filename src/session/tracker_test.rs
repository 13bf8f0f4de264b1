// ABOUTME: Tests for SessionTracker registration, updates, and persistence.
// ABOUTME: Covers snapshot ordering, token attribution, and load round-trips.

use super::operation::{FileOperation, FileOperationEvent};
use super::status::{AgentState, StatusUpdate};
use super::tracker::SessionTracker;
use crate::config::CoordinationConfig;
use crate::error::SessionError;

use tempfile::tempdir;

fn tracker(dir: &tempfile::TempDir) -> SessionTracker {
    SessionTracker::new(CoordinationConfig::rooted_at(dir.path())).unwrap()
}

#[tokio::test]
async fn test_session_id_is_sortable_and_unique() {
    let dir = tempdir().unwrap();
    let a = tracker(&dir);
    let b = tracker(&dir);

    assert!(a.session_id().starts_with("session-"));
    assert_ne!(a.session_id(), b.session_id());
    assert!(a.session_dir().exists());
}

#[tokio::test]
async fn test_register_creates_pending_agent() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    t.register(1, 0).await;
    let snapshot = t.snapshot().await;

    assert_eq!(snapshot.agents.len(), 1);
    assert_eq!(snapshot.agents[0].state, AgentState::Pending);
}

#[tokio::test]
async fn test_update_status_unknown_agent_fails() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    let err = t
        .update_status(42, StatusUpdate::state(AgentState::Running))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownAgent(42)));
}

#[tokio::test]
async fn test_snapshot_orders_agents_by_sequence() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    t.register(30, 2).await;
    t.register(10, 0).await;
    t.register(20, 1).await;

    let snapshot = t.snapshot().await;
    let ids: Vec<u32> = snapshot.agents.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![10, 20, 30]);
}

#[tokio::test]
async fn test_record_operation_appends_in_order() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    t.record_operation(FileOperationEvent::new(1, FileOperation::Lock, "a.txt"))
        .await;
    t.record_operation(FileOperationEvent::new(1, FileOperation::Write, "a.txt"))
        .await;
    t.record_operation(FileOperationEvent::new(1, FileOperation::Unlock, "a.txt"))
        .await;

    let ops = t.snapshot().await.operations;
    assert_eq!(ops.len(), 3);
    assert_eq!(ops[0].operation, FileOperation::Lock);
    assert_eq!(ops[2].operation, FileOperation::Unlock);
}

#[tokio::test]
async fn test_token_usage_attribution() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    t.register(1, 0).await;
    t.update_token_usage(100, Some(1)).await;
    t.update_token_usage(50, None).await;

    let snapshot = t.snapshot().await;
    assert_eq!(snapshot.token_usage.total, 150);
    assert_eq!(snapshot.token_usage.by_agent.get(&1), Some(&100));
    assert_eq!(snapshot.agents[0].tokens_used, 100);
}

#[tokio::test]
async fn test_persist_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let config = CoordinationConfig::rooted_at(dir.path());
    let t = SessionTracker::new(config.clone()).unwrap();

    t.register(1, 0).await;
    t.update_status(1, StatusUpdate::state(AgentState::Running))
        .await
        .unwrap();
    t.record_operation(FileOperationEvent::new(1, FileOperation::Write, "a.txt"))
        .await;
    t.update_token_usage(42, Some(1)).await;
    t.update_status(1, StatusUpdate::state(AgentState::Complete))
        .await
        .unwrap();
    t.finish().await;
    t.persist().await.unwrap();

    assert!(t.session_dir().join("config.json").exists());

    let loaded = SessionTracker::load(&config.session_root, t.session_id())
        .unwrap()
        .unwrap();

    assert_eq!(loaded.session_id, t.session_id());
    assert_eq!(loaded.agents.len(), 1);
    assert_eq!(loaded.agents[0].state, AgentState::Complete);
    assert_eq!(loaded.operations.len(), 1);
    assert_eq!(loaded.token_usage.total, 42);
    assert!(loaded.ended_at.is_some());
}

#[tokio::test]
async fn test_load_missing_session_returns_none() {
    let dir = tempdir().unwrap();
    let loaded = SessionTracker::load(dir.path(), "session-none").unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_save_agent_context_and_result_files() {
    let dir = tempdir().unwrap();
    let t = tracker(&dir);

    t.save_agent_context(1, &serde_json::json!({"task": "update deps"}))
        .await
        .unwrap();
    t.save_agent_result(1, &serde_json::json!({"ok": true}))
        .await
        .unwrap();

    assert!(t.session_dir().join("context-1.json").exists());
    assert!(t.session_dir().join("result-1.json").exists());
}

#[tokio::test]
async fn test_list_sessions_sorted() {
    let dir = tempdir().unwrap();
    let a = tracker(&dir);
    let b = tracker(&dir);

    let root = dir.path().join("sessions");
    let ids = SessionTracker::list_sessions(&root).unwrap();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a.session_id().to_string()));
    assert!(ids.contains(&b.session_id().to_string()));
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn test_list_sessions_missing_root_is_empty() {
    let dir = tempdir().unwrap();
    let ids = SessionTracker::list_sessions(dir.path().join("absent")).unwrap();
    assert!(ids.is_empty());
}
