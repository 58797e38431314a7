// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repo fakes for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use fl_core::{
    AgentId, AgentRecord, AgentStatus, AgentTaskRecord, AgentTaskStatus, FailCause, FormRouteId,
    NetworkId, ResultId, SessionId, SessionRecord, Stage, TaskId, TenantAccess, TenantId, UserId,
};

use super::{
    ActivityLogRepo, ActivityLogRow, AgentRepo, FormRouteRow, MappingResultRow,
    NetworkCredentials, Repos, ResultRepo, RouteRepo, SessionRepo, TaskRepo, TenantRepo,
};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    agents: HashMap<String, AgentRecord>,
    tasks: HashMap<String, AgentTaskRecord>,
    sessions: HashMap<String, SessionStatusRow>,
    routes: HashMap<i64, FormRouteRow>,
    results: HashMap<(i64, u32), (ResultId, MappingResultRow)>,
    next_result_id: i64,
    tenants: HashMap<i64, TenantAccess>,
    flushed_spend: HashMap<i64, (String, i64)>,
    credentials: HashMap<i64, NetworkCredentials>,
    logs: Vec<ActivityLogRow>,
}

struct SessionStatusRow {
    status: String,
    cause: Option<FailCause>,
    updated_at_ms: u64,
}

/// One shared handle implementing every repo trait.
#[derive(Clone, Default)]
pub struct MemoryRepos {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRepos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_repos(self) -> Repos {
        let shared = Arc::new(self);
        Repos {
            agents: shared.clone(),
            tasks: shared.clone(),
            sessions: shared.clone(),
            routes: shared.clone(),
            results: shared.clone(),
            tenants: shared.clone(),
            logs: shared,
        }
    }

    // --- seeding helpers ---

    pub fn seed_route(&self, row: FormRouteRow) {
        self.inner.lock().routes.insert(row.id.0, row);
    }

    pub fn seed_tenant(&self, access: TenantAccess) {
        self.inner.lock().tenants.insert(access.tenant_id.0, access);
    }

    pub fn seed_credentials(&self, creds: NetworkCredentials) {
        self.inner.lock().credentials.insert(creds.network_id.0, creds);
    }

    pub fn flushed_spend(&self, tenant_id: TenantId) -> Option<(String, i64)> {
        self.inner.lock().flushed_spend.get(&tenant_id.0).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn session_cause(&self, id: &SessionId) -> Option<FailCause> {
        self.inner
            .lock()
            .sessions
            .get(id.as_str())
            .and_then(|s| s.cause.clone())
    }

    pub fn route(&self, id: FormRouteId) -> Option<FormRouteRow> {
        self.inner.lock().routes.get(&id.0).cloned()
    }
}

#[async_trait]
impl AgentRepo for MemoryRepos {
    async fn upsert(&self, record: &AgentRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .agents
            .insert(record.id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &AgentId) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self.inner.lock().agents.get(id.as_str()).cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .agents
            .values()
            .find(|a| a.api_key == api_key)
            .cloned())
    }

    async fn heartbeat(
        &self,
        id: &AgentId,
        status: AgentStatus,
        current_task_id: Option<TaskId>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        if let Some(agent) = self.inner.lock().agents.get_mut(id.as_str()) {
            agent.status = status;
            agent.current_task_id = current_task_id;
            agent.last_heartbeat_ms = now_ms;
        }
        Ok(())
    }

    async fn rotate_key(
        &self,
        id: &AgentId,
        user_id: UserId,
        new_key: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.agents.get_mut(id.as_str()) {
            Some(agent) if agent.user_id == user_id => {
                agent.api_key = new_key.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_offline(&self, threshold_ms: u64, now_ms: u64) -> Result<u64, StoreError> {
        let mut swept = 0;
        for agent in self.inner.lock().agents.values_mut() {
            if agent.status != AgentStatus::Offline
                && agent.heartbeat_stale(now_ms, threshold_ms)
            {
                agent.status = AgentStatus::Offline;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl TaskRepo for MemoryRepos {
    async fn insert(&self, record: &AgentTaskRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .tasks
            .insert(record.id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<AgentTaskRecord>, StoreError> {
        Ok(self.inner.lock().tasks.get(id.as_str()).cloned())
    }

    async fn assign(
        &self,
        id: &TaskId,
        agent_id: &AgentId,
        now_ms: u64,
    ) -> Result<Option<AgentTaskRecord>, StoreError> {
        let mut inner = self.inner.lock();
        match inner.tasks.get_mut(id.as_str()) {
            Some(task) if task.status == AgentTaskStatus::Pending => {
                task.status = AgentTaskStatus::Assigned;
                task.agent_id = Some(agent_id.clone());
                task.started_at_ms = Some(now_ms);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete(
        &self,
        id: &TaskId,
        status: AgentTaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.tasks.get_mut(id.as_str()) {
            Some(task)
                if !matches!(
                    task.status,
                    AgentTaskStatus::Completed | AgentTaskStatus::Failed
                ) =>
            {
                task.status = status;
                task.result = result;
                task.error = error;
                task.completed_at_ms = Some(now_ms);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionRepo for MemoryRepos {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.inner.lock().sessions.insert(
            record.id.to_string(),
            SessionStatusRow {
                status: record.phase.status_str().to_string(),
                cause: None,
                updated_at_ms: record.updated_at_ms,
            },
        );
        Ok(())
    }

    async fn set_status(
        &self,
        id: &SessionId,
        status: &str,
        cause: Option<&FailCause>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        if let Some(row) = self.inner.lock().sessions.get_mut(id.as_str()) {
            row.status = status.to_string();
            row.cause = cause.cloned();
            row.updated_at_ms = now_ms;
        }
        Ok(())
    }

    async fn status(&self, id: &SessionId) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(id.as_str())
            .map(|s| s.status.clone()))
    }

    async fn stale_non_terminal(&self, cutoff_ms: u64) -> Result<Vec<SessionId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .iter()
            .filter(|(_, row)| row.status == "running" && row.updated_at_ms < cutoff_ms)
            .map(|(id, _)| SessionId::from_string(id))
            .collect())
    }
}

#[async_trait]
impl RouteRepo for MemoryRepos {
    async fn get(&self, id: FormRouteId) -> Result<Option<FormRouteRow>, StoreError> {
        Ok(self.inner.lock().routes.get(&id.0).cloned())
    }

    async fn patch_stages(
        &self,
        id: FormRouteId,
        login_stages: Option<&[Stage]>,
        navigation_stages: Option<&[Stage]>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(row) = inner.routes.get_mut(&id.0) else {
            return Err(StoreError::RowMissing(format!("form_route {id}")));
        };
        if let Some(stages) = login_stages {
            row.route.login_stages = Some(stages.to_vec());
        }
        if let Some(stages) = navigation_stages {
            row.route.navigation_stages = stages.to_vec();
        }
        Ok(())
    }
}

#[async_trait]
impl ResultRepo for MemoryRepos {
    async fn upsert(&self, row: &MappingResultRow) -> Result<ResultId, StoreError> {
        let mut inner = self.inner.lock();
        let key = (row.form_route_id.0, row.path_number);
        if let Some((id, stored)) = inner.results.get_mut(&key) {
            *stored = row.clone();
            return Ok(*id);
        }
        inner.next_result_id += 1;
        let id = ResultId(inner.next_result_id);
        inner.results.insert(key, (id, row.clone()));
        Ok(id)
    }

    async fn get(
        &self,
        form_route_id: FormRouteId,
        path_number: u32,
    ) -> Result<Option<MappingResultRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .results
            .get(&(form_route_id.0, path_number))
            .map(|(_, row)| row.clone()))
    }

    async fn count_for_route(&self, form_route_id: FormRouteId) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .lock()
            .results
            .keys()
            .filter(|(route, _)| *route == form_route_id.0)
            .count() as u64)
    }
}

#[async_trait]
impl TenantRepo for MemoryRepos {
    async fn access(&self, tenant_id: TenantId) -> Result<Option<TenantAccess>, StoreError> {
        Ok(self.inner.lock().tenants.get(&tenant_id.0).cloned())
    }

    async fn flush_spend(
        &self,
        tenant_id: TenantId,
        day: &str,
        spent_micros: i64,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .flushed_spend
            .insert(tenant_id.0, (day.to_string(), spent_micros));
        Ok(())
    }

    async fn credentials(
        &self,
        network_id: NetworkId,
    ) -> Result<Option<NetworkCredentials>, StoreError> {
        Ok(self.inner.lock().credentials.get(&network_id.0).cloned())
    }
}

#[async_trait]
impl ActivityLogRepo for MemoryRepos {
    async fn insert_batch(&self, rows: &[ActivityLogRow]) -> Result<u64, StoreError> {
        self.inner.lock().logs.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn tail(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ActivityLogRow>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<_> = inner
            .logs
            .iter()
            .filter(|r| &r.session_id == session_id)
            .cloned()
            .collect();
        rows.reverse();
        rows.truncate(limit as usize);
        Ok(rows)
    }
}
