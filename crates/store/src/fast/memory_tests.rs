// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::FastStore;
use super::*;
use fl_core::{AgentTaskKind, SessionRecord, TaskId, TaskName};

fn msg(task_id: &str, user: i64) -> AgentQueueMessage {
    AgentQueueMessage {
        task_id: TaskId::from_string(task_id),
        task_type: AgentTaskKind::ExecStep,
        tenant_id: TenantId(1),
        user_id: UserId(user),
    }
}

#[tokio::test]
async fn agent_queue_is_fifo() {
    let store = MemoryStore::new();
    store.push_agent_task(UserId(1), &msg("task-a", 1)).await.unwrap();
    store.push_agent_task(UserId(1), &msg("task-b", 1)).await.unwrap();

    let first = store.pop_agent_task(UserId(1), 0).await.unwrap().unwrap();
    let second = store.pop_agent_task(UserId(1), 0).await.unwrap().unwrap();
    assert_eq!(first.task_id, "task-a");
    assert_eq!(second.task_id, "task-b");
    assert!(store.pop_agent_task(UserId(1), 0).await.unwrap().is_none());
}

#[tokio::test]
async fn queues_are_isolated_per_user() {
    let store = MemoryStore::new();
    store.push_agent_task(UserId(1), &msg("task-a", 1)).await.unwrap();

    assert!(store.pop_agent_task(UserId(2), 0).await.unwrap().is_none());
    assert!(store.pop_agent_task(UserId(1), 0).await.unwrap().is_some());
}

#[tokio::test]
async fn delayed_entries_promote_when_due() {
    let store = MemoryStore::new();
    store
        .push_agent_task_delayed(UserId(1), &msg("task-later", 1), 60_000)
        .await
        .unwrap();

    assert!(store.pop_agent_task(UserId(1), 59_999).await.unwrap().is_none());
    assert_eq!(store.delayed_len(UserId(1)), 1);

    let promoted = store.pop_agent_task(UserId(1), 60_000).await.unwrap().unwrap();
    assert_eq!(promoted.task_id, "task-later");
    assert_eq!(store.delayed_len(UserId(1)), 0);
}

#[tokio::test]
async fn session_cas_rejects_stale_writers() {
    let store = MemoryStore::new();
    let mut record = SessionRecord::builder().build();
    record.version = 1;
    store.save_session(&record, 0, 7200).await.unwrap();

    // A writer holding the old snapshot loses.
    let mut stale = record.clone();
    stale.version = 2;
    let err = store.save_session(&stale, 0, 7200).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict(_)));

    // The writer holding the current snapshot wins.
    let mut fresh = record.clone();
    fresh.version = 2;
    store.save_session(&fresh, 1, 7200).await.unwrap();
    let loaded = store.load_session(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.version, 2);
}

#[tokio::test]
async fn budget_reservation_is_denied_at_the_line() {
    let store = MemoryStore::new();
    let reserve = store
        .reserve_budget(TenantId(1), "2026-01-01", 400_000, 1_000_000)
        .await
        .unwrap();
    assert!(reserve.allowed);
    assert_eq!(reserve.spent_micros, 400_000);

    let reserve = store
        .reserve_budget(TenantId(1), "2026-01-01", 600_000, 1_000_000)
        .await
        .unwrap();
    assert!(!reserve.allowed);
    // Denied reservation leaves the counter untouched.
    assert_eq!(reserve.spent_micros, 400_000);
}

#[tokio::test]
async fn budget_day_rollover_resets_counter() {
    let store = MemoryStore::new();
    store
        .reserve_budget(TenantId(1), "2026-01-01", 900_000, 1_000_000)
        .await
        .unwrap();

    let next_day = store
        .reserve_budget(TenantId(1), "2026-01-02", 900_000, 1_000_000)
        .await
        .unwrap();
    assert!(next_day.allowed);
    assert_eq!(next_day.spent_micros, 900_000);
}

#[tokio::test]
async fn budget_settlement_adjusts_reservation() {
    let store = MemoryStore::new();
    store
        .reserve_budget(TenantId(1), "2026-01-01", 150_000, 1_000_000)
        .await
        .unwrap();
    // Observed cost was 90k; release the 60k over-reservation.
    let spent = store
        .adjust_budget(TenantId(1), "2026-01-01", -60_000)
        .await
        .unwrap();
    assert_eq!(spent, 90_000);
}

#[tokio::test]
async fn worker_queues_route_by_task() {
    let store = MemoryStore::new();
    let envelope = WorkerEnvelope {
        task: TaskName::AnalyzeFormPage,
        session_id: fl_core::SessionId::from_string("sess-1"),
        args: serde_json::Value::Null,
        dispatched_at_ms: 0,
        session_version: 0,
    };
    store.push_worker(&envelope).await.unwrap();

    assert!(store.pop_worker(WorkerQueue::Runner).await.unwrap().is_none());
    let popped = store.pop_worker(WorkerQueue::Mapper).await.unwrap().unwrap();
    assert_eq!(popped.task, TaskName::AnalyzeFormPage);
}

#[tokio::test]
async fn secret_cache_invalidation() {
    let store = MemoryStore::new();
    store.cache_secret("secret:1:api_key", "sk-plain", 300).await.unwrap();
    assert_eq!(
        store.cached_secret("secret:1:api_key").await.unwrap().as_deref(),
        Some("sk-plain")
    );
    store.invalidate_secret("secret:1:api_key").await.unwrap();
    assert!(store.cached_secret("secret:1:api_key").await.unwrap().is_none());
}
