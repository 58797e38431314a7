// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fast store: session records, queue fabric, budget counters, secret
//! cache.
//!
//! All shared mutable state in the core flows through this trait; no
//! in-memory state is shared across receivers or workers. The Redis
//! implementation is production; the memory implementation backs tests.

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod redis_store;

pub use redis_store::RedisStore;

use async_trait::async_trait;

use fl_core::{AgentQueueMessage, SessionId, SessionRecord, TenantId, UserId, WorkerEnvelope,
    WorkerQueue};

use crate::error::StoreError;

/// Outcome of an atomic budget reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetReserve {
    /// Whether the forecast fit under the daily budget.
    pub allowed: bool,
    /// Spend counter after the operation, micro-USD.
    pub spent_micros: i64,
}

/// The shared fast store.
#[async_trait]
pub trait FastStore: Send + Sync + 'static {
    // --- session records ---

    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Compare-and-swap write of a session record.
    ///
    /// The write succeeds only when the stored version still equals
    /// `expected_version` (or the key is absent for a first write).
    /// Returns `VersionConflict` when a concurrent intake won.
    async fn save_session(
        &self,
        record: &SessionRecord,
        expected_version: u64,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    async fn session_exists(&self, id: &SessionId) -> Result<bool, StoreError>;

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    // --- per-user agent queues ---

    /// Append to the owner's FIFO. Push order is dispatch order.
    async fn push_agent_task(
        &self,
        user_id: UserId,
        msg: &AgentQueueMessage,
    ) -> Result<(), StoreError>;

    /// Pop one entry from the owner's FIFO. Promotes due delayed
    /// entries first, so a waited retry surfaces as soon as it is due.
    async fn pop_agent_task(
        &self,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<Option<AgentQueueMessage>, StoreError>;

    /// Schedule an entry to join the FIFO at `due_ms`.
    async fn push_agent_task_delayed(
        &self,
        user_id: UserId,
        msg: &AgentQueueMessage,
        due_ms: u64,
    ) -> Result<(), StoreError>;

    async fn agent_queue_len(&self, user_id: UserId) -> Result<usize, StoreError>;

    // --- shared worker queues ---

    async fn push_worker(&self, envelope: &WorkerEnvelope) -> Result<(), StoreError>;

    /// Competitive pop from a worker queue; non-blocking.
    async fn pop_worker(&self, queue: WorkerQueue) -> Result<Option<WorkerEnvelope>, StoreError>;

    // --- per-tenant budget counters ---

    /// Atomically roll the day stamp, then reserve `forecast_micros`
    /// if it fits under `daily_budget_micros`. A denied reservation
    /// leaves the counter untouched.
    async fn reserve_budget(
        &self,
        tenant_id: TenantId,
        today: &str,
        forecast_micros: i64,
        daily_budget_micros: i64,
    ) -> Result<BudgetReserve, StoreError>;

    /// Adjust the counter after a call settles: observed minus
    /// reserved (may be negative), or minus the whole reservation when
    /// the call failed.
    async fn adjust_budget(
        &self,
        tenant_id: TenantId,
        today: &str,
        delta_micros: i64,
    ) -> Result<i64, StoreError>;

    /// Current `(day, spent)` for the durable flush.
    async fn read_budget(&self, tenant_id: TenantId)
        -> Result<Option<(String, i64)>, StoreError>;

    /// Tenants holding a live budget counter (for the durable flush).
    async fn budget_tenants(&self) -> Result<Vec<TenantId>, StoreError>;

    // --- secret cache ---

    async fn cache_secret(
        &self,
        key: &str,
        plaintext: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    async fn cached_secret(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn invalidate_secret(&self, key: &str) -> Result<(), StoreError>;
}

/// Fast-store key for a session record.
pub(crate) fn session_key(id: &SessionId) -> String {
    format!("mapper_session:{id}")
}

/// Fast-store key for a user's agent FIFO.
pub(crate) fn agent_queue_key(user_id: UserId) -> String {
    format!("agent:{user_id}")
}

/// Fast-store key for a user's delayed agent dispatches.
pub(crate) fn agent_delayed_key(user_id: UserId) -> String {
    format!("agent-delayed:{user_id}")
}

/// Fast-store key for a tenant's budget counter.
pub(crate) fn budget_key(tenant_id: TenantId) -> String {
    format!("budget:{tenant_id}")
}
