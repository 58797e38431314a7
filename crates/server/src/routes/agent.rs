// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session endpoints: register, heartbeat, poll, results.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use fl_core::{
    generate_api_key, AgentId, AgentRecord, AgentStatus, AgentTaskStatus, Clock, SessionEvent,
    TaskId, TenantId, UserId,
};

use crate::auth::{AgentAuth, UserAuth};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub agent_id: AgentId,
    pub api_key: String,
}

/// Register an agent. The API key is returned only here; an agent that
/// re-registers keeps its existing key.
pub async fn register<C: Clock>(
    State(state): State<AppState<C>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let now = state.intake.clock().epoch_ms();
    let existing = state.intake.repos().agents.get(&body.agent_id).await?;

    let api_key = existing
        .as_ref()
        .map(|agent| agent.api_key.clone())
        .unwrap_or_else(generate_api_key);

    let record = AgentRecord {
        id: body.agent_id,
        tenant_id: body.tenant_id,
        user_id: body.user_id,
        api_key: api_key.clone(),
        status: AgentStatus::Online,
        hostname: body.hostname,
        platform: body.platform,
        version: body.version,
        last_heartbeat_ms: now,
        current_task_id: None,
    };
    state.intake.repos().agents.upsert(&record).await?;
    tracing::info!(agent_id = %record.id, user_id = %record.user_id, "agent registered");

    Ok(Json(RegisterResponse { agent_id: record.id, api_key }))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task_id: Option<TaskId>,
}

pub async fn heartbeat<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<HeartbeatBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .intake
        .repos()
        .agents
        .heartbeat(
            &agent.id,
            body.status,
            body.current_task_id,
            state.intake.clock().epoch_ms(),
        )
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub agent_id: AgentId,
}

/// Pop one task from the caller's per-user queue.
///
/// 204 when the queue is empty, and when a queue entry points at a
/// vanished task row, which is logged and dropped.
pub async fn poll_task<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Query(query): Query<PollQuery>,
) -> Result<Response, ApiError> {
    if agent.id != query.agent_id {
        return Err(ApiError::Forbidden(
            "agent id does not match the authenticated agent".into(),
        ));
    }

    let now = state.intake.clock().epoch_ms();
    let Some(msg) = state
        .intake
        .fast()
        .pop_agent_task(agent.user_id, now)
        .await?
    else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let Some(task) = state
        .intake
        .repos()
        .tasks
        .assign(&msg.task_id, &agent.id, now)
        .await?
    else {
        tracing::warn!(
            task_id = %msg.task_id,
            agent_id = %agent.id,
            "queue entry without an assignable task row, dropped"
        );
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    Ok(Json(serde_json::json!({
        "task_id": task.id,
        "task_type": task.params.kind(),
        "parameters": task.params,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct TaskResultBody {
    pub task_id: TaskId,
    pub status: AgentTaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Write a task result through to the row, then feed the session's
/// state machine. A duplicate post of a settled task is a no-op.
pub async fn task_result<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<TaskResultBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !matches!(
        body.status,
        AgentTaskStatus::Completed | AgentTaskStatus::Failed
    ) {
        return Err(ApiError::BadRequest(
            "task result status must be completed or failed".into(),
        ));
    }

    let task = state
        .intake
        .repos()
        .tasks
        .get(&body.task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {}", body.task_id)))?;
    if task.agent_id.as_ref() != Some(&agent.id) {
        return Err(ApiError::Forbidden(
            "task is not assigned to the posting agent".into(),
        ));
    }

    let settled = state
        .intake
        .repos()
        .tasks
        .complete(
            &body.task_id,
            body.status,
            body.result.clone(),
            body.error.clone(),
            state.intake.clock().epoch_ms(),
        )
        .await?;
    if !settled {
        // Idempotent re-post: the row already settled, the state
        // machine already heard about it.
        return Ok(Json(serde_json::json!({ "ok": true })));
    }

    if let Some(session_id) = task.session_id {
        let event = SessionEvent::AgentResult {
            task_id: body.task_id,
            kind: task.params.kind(),
            success: body.status == AgentTaskStatus::Completed,
            result: body.result,
            error: body.error,
        };
        state.intake.submit(&session_id, event, None).await?;
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct TaskProgressBody {
    pub task_id: TaskId,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Best-effort, non-persisted.
pub async fn task_progress<C: Clock>(
    State(_state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<TaskProgressBody>,
) -> Json<serde_json::Value> {
    tracing::debug!(
        agent_id = %agent.id,
        task_id = %body.task_id,
        progress = body.progress,
        message = body.message.as_deref().unwrap_or(""),
        "task progress"
    );
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
pub struct RegenerateKeyBody {
    pub agent_id: AgentId,
}

/// Rotate an agent's API key. User-authenticated: the dashboard calls
/// this, not the agent.
pub async fn regenerate_api_key<C: Clock>(
    State(state): State<AppState<C>>,
    UserAuth(user_id): UserAuth,
    Json(body): Json<RegenerateKeyBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_key = generate_api_key();
    let rotated = state
        .intake
        .repos()
        .agents
        .rotate_key(&body.agent_id, user_id, &new_key)
        .await?;
    if !rotated {
        return Err(ApiError::NotFound(
            "agent not found or not owned by user".into(),
        ));
    }
    tracing::info!(agent_id = %body.agent_id, user_id = %user_id, "agent API key rotated");
    Ok(Json(serde_json::json!({
        "agent_id": body.agent_id,
        "api_key": new_key,
    })))
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
