// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent records: the customer-side browser drivers.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::id::{AgentId, TaskId, TenantId, UserId};

/// Length of an agent API key.
pub const API_KEY_LEN: usize = 64;

/// Generate a fresh agent API key.
pub fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Reported agent status. Agents whose heartbeat goes stale are swept
/// to `offline` by a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Idle,
    Busy,
    Offline,
}

crate::simple_display! {
    AgentStatus {
        Online => "online",
        Idle => "idle",
        Busy => "busy",
        Offline => "offline",
    }
}

/// Authoritative agent record (relational store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    /// Issued once at registration; returned only then.
    pub api_key: String,
    pub status: AgentStatus,
    pub hostname: String,
    pub platform: String,
    pub version: String,
    pub last_heartbeat_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
}

impl AgentRecord {
    pub fn heartbeat_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > threshold_ms
    }
}

crate::builder! {
    pub struct AgentRecordBuilder => AgentRecord {
        into {
            id: AgentId = "agt-test",
            api_key: String = "k".repeat(API_KEY_LEN),
            hostname: String = "test-host",
            platform: String = "linux",
            version: String = "1.0.0",
        }
        set {
            tenant_id: TenantId = TenantId(1),
            user_id: UserId = UserId(1),
            status: AgentStatus = AgentStatus::Online,
            last_heartbeat_ms: u64 = 0,
        }
        option {
            current_task_id: TaskId = None,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
