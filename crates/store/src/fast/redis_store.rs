// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis implementation of the fast store.
//!
//! Session writes and budget reservations are Lua scripts so the
//! version CAS and the check-and-reserve are atomic per key.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use fl_core::{AgentQueueMessage, SessionId, SessionRecord, TenantId, UserId, WorkerEnvelope,
    WorkerQueue};

use super::{agent_delayed_key, agent_queue_key, budget_key, session_key, BudgetReserve,
    FastStore};
use crate::error::StoreError;

/// CAS write of a session record hash: succeeds only when the stored
/// version matches the caller's snapshot (or the key is absent).
const SAVE_SESSION: &str = r"
local cur = redis.call('HGET', KEYS[1], 'version')
if cur and tonumber(cur) ~= tonumber(ARGV[1]) then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'record', ARGV[3])
redis.call('EXPIRE', KEYS[1], ARGV[4])
return 1
";

/// Day-rolling check-and-reserve on a tenant budget hash.
const RESERVE_BUDGET: &str = r"
local day = redis.call('HGET', KEYS[1], 'day')
if day ~= ARGV[1] then
  redis.call('HSET', KEYS[1], 'day', ARGV[1])
  redis.call('HSET', KEYS[1], 'spent', 0)
end
local spent = tonumber(redis.call('HGET', KEYS[1], 'spent') or '0')
local forecast = tonumber(ARGV[2])
local budget = tonumber(ARGV[3])
if spent + forecast >= budget then
  return {0, spent}
end
local after = redis.call('HINCRBY', KEYS[1], 'spent', forecast)
return {1, after}
";

/// Settlement adjustment; also day-guarded so a late settlement cannot
/// resurrect yesterday's counter.
const ADJUST_BUDGET: &str = r"
local day = redis.call('HGET', KEYS[1], 'day')
if day ~= ARGV[1] then
  redis.call('HSET', KEYS[1], 'day', ARGV[1])
  redis.call('HSET', KEYS[1], 'spent', 0)
end
return redis.call('HINCRBY', KEYS[1], 'spent', ARGV[2])
";

/// Redis-backed fast store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    save_session: Script,
    reserve_budget: Script,
    adjust_budget: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            save_session: Script::new(SAVE_SESSION),
            reserve_budget: Script::new(RESERVE_BUDGET),
            adjust_budget: Script::new(ADJUST_BUDGET),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl FastStore for RedisStore {
    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.hget(session_key(id), "record").await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_session(
        &self,
        record: &SessionRecord,
        expected_version: u64,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn();
        let ok: i32 = self
            .save_session
            .key(session_key(&record.id))
            .arg(expected_version)
            .arg(record.version)
            .arg(json)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        if ok == 1 {
            Ok(())
        } else {
            Err(StoreError::VersionConflict(record.id.to_string()))
        }
    }

    async fn session_exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        Ok(conn.exists(session_key(id)).await?)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.del(session_key(id)).await?;
        Ok(())
    }

    async fn push_agent_task(
        &self,
        user_id: UserId,
        msg: &AgentQueueMessage,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(msg)?;
        let mut conn = self.conn();
        let _: () = conn.rpush(agent_queue_key(user_id), json).await?;
        Ok(())
    }

    async fn pop_agent_task(
        &self,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<Option<AgentQueueMessage>, StoreError> {
        let mut conn = self.conn();

        // Promote due delayed entries into the FIFO first.
        let delayed_key = agent_delayed_key(user_id);
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed_key)
            .arg(0)
            .arg(now_ms)
            .query_async(&mut conn)
            .await?;
        for entry in &due {
            let _: () = conn.rpush(agent_queue_key(user_id), entry).await?;
            let _: () = conn.zrem(&delayed_key, entry).await?;
        }

        let raw: Option<String> = conn.lpop(agent_queue_key(user_id), None).await?;
        match raw {
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
        let mut conn = self.conn();
        let _: () = conn.zadd(agent_delayed_key(user_id), json, due_ms).await?;
        Ok(())
    }

    async fn agent_queue_len(&self, user_id: UserId) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        Ok(conn.llen(agent_queue_key(user_id)).await?)
    }

    async fn push_worker(&self, envelope: &WorkerEnvelope) -> Result<(), StoreError> {
        let json = serde_json::to_string(envelope)?;
        let mut conn = self.conn();
        let _: () = conn.rpush(envelope.task.queue().key(), json).await?;
        Ok(())
    }

    async fn pop_worker(&self, queue: WorkerQueue) -> Result<Option<WorkerEnvelope>, StoreError> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.lpop(queue.key(), None).await?;
        match raw {
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
        let mut conn = self.conn();
        let (allowed, spent): (i64, i64) = self
            .reserve_budget
            .key(budget_key(tenant_id))
            .arg(today)
            .arg(forecast_micros)
            .arg(daily_budget_micros)
            .invoke_async(&mut conn)
            .await?;
        Ok(BudgetReserve { allowed: allowed == 1, spent_micros: spent })
    }

    async fn adjust_budget(
        &self,
        tenant_id: TenantId,
        today: &str,
        delta_micros: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        let spent: i64 = self
            .adjust_budget
            .key(budget_key(tenant_id))
            .arg(today)
            .arg(delta_micros)
            .invoke_async(&mut conn)
            .await?;
        Ok(spent)
    }

    async fn read_budget(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<(String, i64)>, StoreError> {
        let mut conn = self.conn();
        let (day, spent): (Option<String>, Option<i64>) = redis::pipe()
            .hget(budget_key(tenant_id), "day")
            .hget(budget_key(tenant_id), "spent")
            .query_async(&mut conn)
            .await?;
        match day {
            Some(day) => Ok(Some((day, spent.unwrap_or(0)))),
            None => Ok(None),
        }
    }

    async fn budget_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let mut conn = self.conn();
        let mut tenants = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("budget:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                if let Some(id) = key.strip_prefix("budget:").and_then(|s| s.parse().ok()) {
                    tenants.push(TenantId(id));
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(tenants)
    }

    async fn cache_secret(
        &self,
        key: &str,
        plaintext: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.set_ex(key, plaintext, ttl_secs).await?;
        Ok(())
    }

    async fn cached_secret(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        Ok(conn.get(key).await?)
    }

    async fn invalidate_secret(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
