// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres implementations of the repo traits.
//!
//! JSON payloads (task params, stage lists, log extras) are stored as
//! serialized text columns and decoded at the edge; timestamps are
//! epoch-millisecond BIGINTs throughout.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use fl_core::{
    AgentId, AgentRecord, AgentStatus, AgentTaskRecord, AgentTaskStatus, FailCause, FormRouteId,
    NetworkId, ProjectId, ResultId, SessionId, SessionRecord, Stage, TaskId, TenantAccess,
    TenantId, UserId,
};

use super::{
    ActivityLogRepo, ActivityLogRow, AgentRepo, FormRouteRow, MappingResultRow,
    NetworkCredentials, Repos, ResultRepo, RouteRepo, SessionRepo, TaskRepo, TenantRepo,
};
use crate::error::StoreError;

/// Connect a pool and bundle the Postgres repos.
pub async fn connect(database_url: &str) -> Result<Repos, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    Ok(PgRepos::new(pool).into_repos())
}

/// Run embedded migrations (CLI `fl migrate`).
pub async fn migrate(database_url: &str) -> Result<(), StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StoreError::Database(e.into()))?;
    Ok(())
}

/// All repo traits over one pool.
#[derive(Clone)]
pub struct PgRepos {
    pool: PgPool,
}

impl PgRepos {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
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
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::Value::String(
        raw.to_string(),
    ))?)
}

fn agent_from_row(row: &PgRow) -> Result<AgentRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let current_task_id: Option<String> = row.try_get("current_task_id")?;
    Ok(AgentRecord {
        id: AgentId::from_string(row.try_get::<String, _>("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        user_id: UserId(row.try_get("user_id")?),
        api_key: row.try_get("api_key")?,
        status: parse_enum(&status)?,
        hostname: row.try_get("hostname")?,
        platform: row.try_get("platform")?,
        version: row.try_get("version")?,
        last_heartbeat_ms: row.try_get::<i64, _>("last_heartbeat_ms")? as u64,
        current_task_id: current_task_id.map(TaskId::from_string),
    })
}

#[async_trait]
impl AgentRepo for PgRepos {
    async fn upsert(&self, record: &AgentRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agents
                (id, tenant_id, user_id, api_key, status, hostname, platform, version,
                 last_heartbeat_ms, current_task_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                user_id = EXCLUDED.user_id,
                api_key = EXCLUDED.api_key,
                status = EXCLUDED.status,
                hostname = EXCLUDED.hostname,
                platform = EXCLUDED.platform,
                version = EXCLUDED.version,
                last_heartbeat_ms = EXCLUDED.last_heartbeat_ms
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.tenant_id.0)
        .bind(record.user_id.0)
        .bind(&record.api_key)
        .bind(record.status.to_string())
        .bind(&record.hostname)
        .bind(&record.platform)
        .bind(&record.version)
        .bind(record.last_heartbeat_ms as i64)
        .bind(record.current_task_id.as_ref().map(|t| t.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &AgentId) -> Result<Option<AgentRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<AgentRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn heartbeat(
        &self,
        id: &AgentId,
        status: AgentStatus,
        current_task_id: Option<TaskId>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE agents SET status = $2, current_task_id = $3, last_heartbeat_ms = $4
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(current_task_id.map(|t| t.to_string()))
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_key(
        &self,
        id: &AgentId,
        user_id: UserId,
        new_key: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE agents SET api_key = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(id.as_str())
        .bind(user_id.0)
        .bind(new_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_offline(&self, threshold_ms: u64, now_ms: u64) -> Result<u64, StoreError> {
        let cutoff = now_ms.saturating_sub(threshold_ms) as i64;
        let result = sqlx::query(
            "UPDATE agents SET status = 'offline'
             WHERE status <> 'offline' AND last_heartbeat_ms < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn task_from_row(row: &PgRow) -> Result<AgentTaskRecord, StoreError> {
    let params: String = row.try_get("params")?;
    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result")?;
    let agent_id: Option<String> = row.try_get("agent_id")?;
    let session_id: Option<String> = row.try_get("session_id")?;
    Ok(AgentTaskRecord {
        id: TaskId::from_string(row.try_get::<String, _>("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        user_id: UserId(row.try_get("user_id")?),
        agent_id: agent_id.map(AgentId::from_string),
        params: serde_json::from_str(&params)?,
        status: parse_enum(&status)?,
        result: result.map(|r| serde_json::from_str(&r)).transpose()?,
        error: row.try_get("error")?,
        session_id: session_id.map(SessionId::from_string),
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        started_at_ms: row
            .try_get::<Option<i64>, _>("started_at_ms")?
            .map(|v| v as u64),
        completed_at_ms: row
            .try_get::<Option<i64>, _>("completed_at_ms")?
            .map(|v| v as u64),
    })
}

#[async_trait]
impl TaskRepo for PgRepos {
    async fn insert(&self, record: &AgentTaskRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_tasks
                (id, tenant_id, user_id, agent_id, session_id, task_type, params, status,
                 result, error, created_at_ms, started_at_ms, completed_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.tenant_id.0)
        .bind(record.user_id.0)
        .bind(record.agent_id.as_ref().map(|a| a.to_string()))
        .bind(record.session_id.as_ref().map(|s| s.to_string()))
        .bind(record.params.kind().to_string())
        .bind(serde_json::to_string(&record.params)?)
        .bind(record.status.to_string())
        .bind(
            record
                .result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(record.error.as_deref())
        .bind(record.created_at_ms as i64)
        .bind(record.started_at_ms.map(|v| v as i64))
        .bind(record.completed_at_ms.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<AgentTaskRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM agent_tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn assign(
        &self,
        id: &TaskId,
        agent_id: &AgentId,
        now_ms: u64,
    ) -> Result<Option<AgentTaskRecord>, StoreError> {
        let row = sqlx::query(
            "UPDATE agent_tasks SET status = 'assigned', agent_id = $2, started_at_ms = $3
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(id.as_str())
        .bind(agent_id.as_str())
        .bind(now_ms as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn complete(
        &self,
        id: &TaskId,
        status: AgentTaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE agent_tasks
             SET status = $2, result = $3, error = $4, completed_at_ms = $5
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(error.as_deref())
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepo for PgRepos {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mapping_sessions
                (id, tenant_id, user_id, project_id, network_id, form_route_id, test_page_id,
                 activity, status, created_at_ms, updated_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.tenant_id.0)
        .bind(record.user_id.0)
        .bind(record.project_id.0)
        .bind(record.network_id.0)
        .bind(record.form_route_id.map(|r| r.0))
        .bind(record.test_page_id.map(|t| t.0))
        .bind(record.activity.to_string())
        .bind(record.phase.status_str())
        .bind(record.created_at_ms as i64)
        .bind(record.updated_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: &SessionId,
        status: &str,
        cause: Option<&FailCause>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE mapping_sessions
             SET status = $2, fail_code = $3, fail_message = $4, updated_at_ms = $5
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(status)
        .bind(cause.map(|c| c.code.to_string()))
        .bind(cause.map(|c| c.message.as_str()))
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn status(&self, id: &SessionId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT status FROM mapping_sessions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("status"))
            .transpose()
            .map_err(Into::into)
    }

    async fn stale_non_terminal(&self, cutoff_ms: u64) -> Result<Vec<SessionId>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM mapping_sessions
             WHERE status = 'running' AND updated_at_ms < $1",
        )
        .bind(cutoff_ms as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(SessionId::from_string(row.try_get::<String, _>("id")?))
            })
            .collect()
    }
}

#[async_trait]
impl RouteRepo for PgRepos {
    async fn get(&self, id: FormRouteId) -> Result<Option<FormRouteRow>, StoreError> {
        let row = sqlx::query("SELECT * FROM form_routes WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let route: String = row.try_get("route")?;
        Ok(Some(FormRouteRow {
            id: FormRouteId(row.try_get("id")?),
            project_id: ProjectId(row.try_get("project_id")?),
            network_id: NetworkId(row.try_get("network_id")?),
            parent_id: row
                .try_get::<Option<i64>, _>("parent_id")?
                .map(FormRouteId),
            route: serde_json::from_str(&route)?,
        }))
    }

    async fn patch_stages(
        &self,
        id: FormRouteId,
        login_stages: Option<&[Stage]>,
        navigation_stages: Option<&[Stage]>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT route FROM form_routes WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::RowMissing(format!("form_route {id}")));
        };
        let raw: String = row.try_get("route")?;
        let mut route: fl_core::RouteSnapshot = serde_json::from_str(&raw)?;
        if let Some(stages) = login_stages {
            route.login_stages = Some(stages.to_vec());
        }
        if let Some(stages) = navigation_stages {
            route.navigation_stages = stages.to_vec();
        }
        sqlx::query("UPDATE form_routes SET route = $2 WHERE id = $1")
            .bind(id.0)
            .bind(serde_json::to_string(&route)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ResultRepo for PgRepos {
    async fn upsert(&self, row: &MappingResultRow) -> Result<ResultId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO mapping_results
                (form_route_id, path_number, steps, verified_fields, created_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (form_route_id, path_number) DO UPDATE SET
                steps = EXCLUDED.steps,
                verified_fields = EXCLUDED.verified_fields,
                created_at_ms = EXCLUDED.created_at_ms
            RETURNING id
            "#,
        )
        .bind(row.form_route_id.0)
        .bind(row.path_number as i32)
        .bind(serde_json::to_string(&row.steps)?)
        .bind(serde_json::to_string(&row.verified_fields)?)
        .bind(row.created_at_ms as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(ResultId(result.try_get("id")?))
    }

    async fn get(
        &self,
        form_route_id: FormRouteId,
        path_number: u32,
    ) -> Result<Option<MappingResultRow>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM mapping_results WHERE form_route_id = $1 AND path_number = $2",
        )
        .bind(form_route_id.0)
        .bind(path_number as i32)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let steps: String = row.try_get("steps")?;
        let verified: String = row.try_get("verified_fields")?;
        Ok(Some(MappingResultRow {
            form_route_id: FormRouteId(row.try_get("form_route_id")?),
            path_number: row.try_get::<i32, _>("path_number")? as u32,
            steps: serde_json::from_str(&steps)?,
            verified_fields: serde_json::from_str(&verified)?,
            created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        }))
    }

    async fn count_for_route(&self, form_route_id: FormRouteId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM mapping_results WHERE form_route_id = $1")
            .bind(form_route_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }
}

#[async_trait]
impl TenantRepo for PgRepos {
    async fn access(&self, tenant_id: TenantId) -> Result<Option<TenantAccess>, StoreError> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let status: String = row.try_get("access_status")?;
        let model: String = row.try_get("access_model")?;
        Ok(Some(TenantAccess {
            tenant_id: TenantId(row.try_get("id")?),
            status: parse_enum(&status)?,
            model: parse_enum(&model)?,
            trial_start_ms: row
                .try_get::<Option<i64>, _>("trial_start_ms")?
                .map(|v| v as u64),
            trial_days: row.try_get::<i32, _>("trial_days")? as u32,
            daily_budget_micros: row.try_get("daily_budget_micros")?,
            api_key_ciphertext: row.try_get("api_key_ciphertext")?,
            debug_mode: row.try_get("debug_mode")?,
        }))
    }

    async fn flush_spend(
        &self,
        tenant_id: TenantId,
        day: &str,
        spent_micros: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tenants SET spend_day = $2, spent_today_micros = $3 WHERE id = $1",
        )
        .bind(tenant_id.0)
        .bind(day)
        .bind(spent_micros)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn credentials(
        &self,
        network_id: NetworkId,
    ) -> Result<Option<NetworkCredentials>, StoreError> {
        let row = sqlx::query("SELECT * FROM network_credentials WHERE network_id = $1")
            .bind(network_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(NetworkCredentials {
            network_id: NetworkId(row.try_get("network_id")?),
            login_url: row.try_get("login_url")?,
            username: row.try_get("username")?,
            password_ciphertext: row.try_get("password_ciphertext")?,
            totp_seed_ciphertext: row.try_get("totp_seed_ciphertext")?,
            login_hints: row.try_get("login_hints")?,
        }))
    }
}

#[async_trait]
impl ActivityLogRepo for PgRepos {
    async fn insert_batch(&self, rows: &[ActivityLogRow]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO activity_logs
                    (session_id, timestamp_ms, level, category, message, extra)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(row.session_id.as_str())
            .bind(row.timestamp_ms as i64)
            .bind(&row.level)
            .bind(&row.category)
            .bind(&row.message)
            .bind(row.extra.as_ref().map(serde_json::to_string).transpose()?)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn tail(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ActivityLogRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM activity_logs WHERE session_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(session_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let extra: Option<String> = row.try_get("extra")?;
                Ok(ActivityLogRow {
                    session_id: SessionId::from_string(row.try_get::<String, _>("session_id")?),
                    timestamp_ms: row.try_get::<i64, _>("timestamp_ms")? as u64,
                    level: row.try_get("level")?,
                    category: row.try_get("category")?,
                    message: row.try_get("message")?,
                    extra: extra.map(|e| serde_json::from_str(&e)).transpose()?,
                })
            })
            .collect()
    }
}
