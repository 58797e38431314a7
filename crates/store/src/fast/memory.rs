// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fast store for tests.
//!
//! Mirrors the Redis implementation's observable behavior: version CAS,
//! FIFO order, delayed promotion, day-rolling budget counters. TTLs are
//! not simulated; tests drop keys explicitly with `expire_session`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use fl_core::{AgentQueueMessage, SessionId, SessionRecord, TenantId, UserId, WorkerEnvelope,
    WorkerQueue};

use super::{BudgetReserve, FastStore};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, (u64, String)>,
    agent_queues: HashMap<i64, VecDeque<String>>,
    delayed: HashMap<i64, BTreeMap<u64, Vec<String>>>,
    worker_queues: HashMap<&'static str, VecDeque<String>>,
    budgets: HashMap<i64, (String, i64)>,
    secrets: HashMap<String, String>,
}

/// Shared-handle in-memory fast store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a session key, simulating TTL expiry.
    pub fn expire_session(&self, id: &SessionId) {
        self.inner.lock().sessions.remove(id.as_str());
    }

    /// Number of entries waiting in a user's delayed set.
    pub fn delayed_len(&self, user_id: UserId) -> usize {
        self.inner
            .lock()
            .delayed
            .get(&user_id.0)
            .map_or(0, |m| m.values().map(Vec::len).sum())
    }

    /// Number of envelopes waiting on a worker queue.
    pub fn worker_queue_len(&self, queue: WorkerQueue) -> usize {
        self.inner
            .lock()
            .worker_queues
            .get(queue.key())
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl FastStore for MemoryStore {
    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let inner = self.inner.lock();
        match inner.sessions.get(id.as_str()) {
            Some((_, json)) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save_session(
        &self,
        record: &SessionRecord,
        expected_version: u64,
        _ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let mut inner = self.inner.lock();
        if let Some((stored_version, _)) = inner.sessions.get(record.id.as_str()) {
            if *stored_version != expected_version {
                return Err(StoreError::VersionConflict(record.id.to_string()));
            }
        }
        inner
            .sessions
            .insert(record.id.to_string(), (record.version, json));
        Ok(())
    }

    async fn session_exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().sessions.contains_key(id.as_str()))
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.inner.lock().sessions.remove(id.as_str());
        Ok(())
    }

    async fn push_agent_task(
        &self,
        user_id: UserId,
        msg: &AgentQueueMessage,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(msg)?;
        self.inner
            .lock()
            .agent_queues
            .entry(user_id.0)
            .or_default()
            .push_back(json);
        Ok(())
    }

    async fn pop_agent_task(
        &self,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<Option<AgentQueueMessage>, StoreError> {
        let mut inner = self.inner.lock();

        // Promote due delayed entries in due order.
        if let Some(delayed) = inner.delayed.remove(&user_id.0) {
            let mut remaining = BTreeMap::new();
            let mut promoted = Vec::new();
            for (due, entries) in delayed {
                if due <= now_ms {
                    promoted.extend(entries);
                } else {
                    remaining.insert(due, entries);
                }
            }
            if !remaining.is_empty() {
                inner.delayed.insert(user_id.0, remaining);
            }
            let queue = inner.agent_queues.entry(user_id.0).or_default();
            for entry in promoted {
                queue.push_back(entry);
            }
        }

        let entry = inner
            .agent_queues
            .get_mut(&user_id.0)
            .and_then(VecDeque::pop_front);
        match entry {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn push_agent_task_delayed(
        &self,
        user_id: UserId,
        msg: &AgentQueueMessage,
        due_ms: u64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(msg)?;
        self.inner
            .lock()
            .delayed
            .entry(user_id.0)
            .or_default()
            .entry(due_ms)
            .or_default()
            .push(json);
        Ok(())
    }

    async fn agent_queue_len(&self, user_id: UserId) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .agent_queues
            .get(&user_id.0)
            .map_or(0, VecDeque::len))
    }

    async fn push_worker(&self, envelope: &WorkerEnvelope) -> Result<(), StoreError> {
        let json = serde_json::to_string(envelope)?;
        self.inner
            .lock()
            .worker_queues
            .entry(envelope.task.queue().key())
            .or_default()
            .push_back(json);
        Ok(())
    }

    async fn pop_worker(&self, queue: WorkerQueue) -> Result<Option<WorkerEnvelope>, StoreError> {
        let entry = self
            .inner
            .lock()
            .worker_queues
            .get_mut(queue.key())
            .and_then(VecDeque::pop_front);
        match entry {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn reserve_budget(
        &self,
        tenant_id: TenantId,
        today: &str,
        forecast_micros: i64,
        daily_budget_micros: i64,
    ) -> Result<BudgetReserve, StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .budgets
            .entry(tenant_id.0)
            .or_insert_with(|| (today.to_string(), 0));
        if entry.0 != today {
            *entry = (today.to_string(), 0);
        }
        if entry.1 + forecast_micros >= daily_budget_micros {
            return Ok(BudgetReserve { allowed: false, spent_micros: entry.1 });
        }
        entry.1 += forecast_micros;
        Ok(BudgetReserve { allowed: true, spent_micros: entry.1 })
    }

    async fn adjust_budget(
        &self,
        tenant_id: TenantId,
        today: &str,
        delta_micros: i64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .budgets
            .entry(tenant_id.0)
            .or_insert_with(|| (today.to_string(), 0));
        if entry.0 != today {
            *entry = (today.to_string(), 0);
        }
        entry.1 += delta_micros;
        Ok(entry.1)
    }

    async fn read_budget(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<(String, i64)>, StoreError> {
        Ok(self.inner.lock().budgets.get(&tenant_id.0).cloned())
    }

    async fn budget_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        Ok(self.inner.lock().budgets.keys().map(|id| TenantId(*id)).collect())
    }

    async fn cache_secret(
        &self,
        key: &str,
        plaintext: &str,
        _ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .secrets
            .insert(key.to_string(), plaintext.to_string());
        Ok(())
    }

    async fn cached_secret(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().secrets.get(key).cloned())
    }

    async fn invalidate_secret(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().secrets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
