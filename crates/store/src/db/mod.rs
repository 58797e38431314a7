// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relational store: authoritative rows behind the fast store.
//!
//! Repos are trait objects so the engine and server run identically
//! over Postgres and over the in-memory fakes used by tests.

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod pg;

pub use pg::{connect as connect_pg, migrate, PgRepos};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fl_core::{
    AgentId, AgentRecord, AgentStatus, AgentTaskRecord, AgentTaskStatus, FailCause, FormRouteId,
    NetworkId, ProjectId, ResultId, RouteSnapshot, SessionId, SessionRecord, Stage, TaskId,
    TenantAccess, TenantId, UserId,
};

use crate::error::StoreError;

/// A form route row: the named form plus its navigation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRouteRow {
    pub id: FormRouteId,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FormRouteId>,
    pub route: RouteSnapshot,
}

/// Durable mapping result: one row per `(form_route, path_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResultRow {
    pub form_route_id: FormRouteId,
    pub path_number: u32,
    pub steps: Vec<fl_core::ExecutedStep>,
    #[serde(default)]
    pub verified_fields: Vec<String>,
    pub created_at_ms: u64,
}

/// One structured activity log entry posted by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogRow {
    pub session_id: SessionId,
    pub timestamp_ms: u64,
    pub level: String,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Stored browser credentials for one network. The password and TOTP
/// seed are KMS ciphertexts; the username is display-masked, not
/// encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    pub network_id: NetworkId,
    pub login_url: String,
    pub username: String,
    pub password_ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_seed_ciphertext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hints: Option<String>,
}

#[async_trait]
pub trait AgentRepo: Send + Sync + 'static {
    /// Insert or refresh an agent. Re-registration keeps the existing
    /// API key; the caller decides whether to mint one.
    async fn upsert(&self, record: &AgentRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &AgentId) -> Result<Option<AgentRecord>, StoreError>;

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<AgentRecord>, StoreError>;

    async fn heartbeat(
        &self,
        id: &AgentId,
        status: AgentStatus,
        current_task_id: Option<TaskId>,
        now_ms: u64,
    ) -> Result<(), StoreError>;

    /// Rotate the key iff the agent belongs to `user_id`.
    async fn rotate_key(
        &self,
        id: &AgentId,
        user_id: UserId,
        new_key: &str,
    ) -> Result<bool, StoreError>;

    /// Mark agents with stale heartbeats offline; returns the count.
    async fn sweep_offline(&self, threshold_ms: u64, now_ms: u64) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TaskRepo: Send + Sync + 'static {
    async fn insert(&self, record: &AgentTaskRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &TaskId) -> Result<Option<AgentTaskRecord>, StoreError>;

    /// Mark a pending task assigned to `agent_id` and return it.
    async fn assign(
        &self,
        id: &TaskId,
        agent_id: &AgentId,
        now_ms: u64,
    ) -> Result<Option<AgentTaskRecord>, StoreError>;

    /// Write a terminal result through to the row. Returns false when
    /// the task already settled (idempotent re-posts are no-ops).
    async fn complete(
        &self,
        id: &TaskId,
        status: AgentTaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync + 'static {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn set_status(
        &self,
        id: &SessionId,
        status: &str,
        cause: Option<&FailCause>,
        now_ms: u64,
    ) -> Result<(), StoreError>;

    async fn status(&self, id: &SessionId) -> Result<Option<String>, StoreError>;

    /// Non-terminal sessions last touched before `cutoff_ms`, for the
    /// timeout sweeper.
    async fn stale_non_terminal(&self, cutoff_ms: u64) -> Result<Vec<SessionId>, StoreError>;
}

#[async_trait]
pub trait RouteRepo: Send + Sync + 'static {
    async fn get(&self, id: FormRouteId) -> Result<Option<FormRouteRow>, StoreError>;

    /// Patch healed login/navigation stages back onto the route.
    async fn patch_stages(
        &self,
        id: FormRouteId,
        login_stages: Option<&[Stage]>,
        navigation_stages: Option<&[Stage]>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ResultRepo: Send + Sync + 'static {
    /// Insert or replace the row for `(form_route_id, path_number)`.
    async fn upsert(&self, row: &MappingResultRow) -> Result<ResultId, StoreError>;

    async fn get(
        &self,
        form_route_id: FormRouteId,
        path_number: u32,
    ) -> Result<Option<MappingResultRow>, StoreError>;

    async fn count_for_route(&self, form_route_id: FormRouteId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TenantRepo: Send + Sync + 'static {
    async fn access(&self, tenant_id: TenantId) -> Result<Option<TenantAccess>, StoreError>;

    /// Persist the fast-store spend counter (periodic flush).
    async fn flush_spend(
        &self,
        tenant_id: TenantId,
        day: &str,
        spent_micros: i64,
    ) -> Result<(), StoreError>;

    async fn credentials(
        &self,
        network_id: NetworkId,
    ) -> Result<Option<NetworkCredentials>, StoreError>;
}

#[async_trait]
pub trait ActivityLogRepo: Send + Sync + 'static {
    async fn insert_batch(&self, rows: &[ActivityLogRow]) -> Result<u64, StoreError>;

    /// Latest entries for a session, newest first.
    async fn tail(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ActivityLogRow>, StoreError>;
}

/// Bundle of repo handles threaded through the engine and server.
#[derive(Clone)]
pub struct Repos {
    pub agents: Arc<dyn AgentRepo>,
    pub tasks: Arc<dyn TaskRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub routes: Arc<dyn RouteRepo>,
    pub results: Arc<dyn ResultRepo>,
    pub tenants: Arc<dyn TenantRepo>,
    pub logs: Arc<dyn ActivityLogRepo>,
}
