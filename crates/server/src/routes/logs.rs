// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity log ingestion and tail.
//!
//! Small batches fan straight into the relational table. Batches over
//! the threshold detour through object storage: the agent gets a
//! presigned PUT, uploads the bundle, and posts the object key; a
//! background task pulls it apart and deletes the blob.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use fl_core::{Clock, SessionId, TaskName, WorkerEnvelope};
use fl_objstore::{ObjectKey, ObjectKind, PresignRequest};
use fl_store::ActivityLogRow;

use crate::auth::AgentAuth;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, serde::Serialize, Deserialize)]
pub struct LogEntryBody {
    pub timestamp_ms: u64,
    pub level: String,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub session_id: SessionId,
    pub project_id: fl_core::ProjectId,
    pub entries: Vec<LogEntryBody>,
}

/// Ingest a log batch, or hand back an upload slot when it is too big
/// to carry inline.
pub async fn ingest<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<IngestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let serialized_len = serde_json::to_vec(&body.entries)
        .map(|v| v.len())
        .unwrap_or(usize::MAX);

    if serialized_len > state.config.log_blob_threshold_bytes {
        let Some(objstore) = &state.objstore else {
            return Err(ApiError::Internal("object store not configured".into()));
        };
        let key = ObjectKey::new(
            ObjectKind::LogBundle,
            agent.tenant_id,
            body.project_id,
            body.session_id,
            format!("batch-{}.json", state.intake.clock().epoch_ms()),
        )?;
        let presigned = objstore
            .presign_put(
                &PresignRequest {
                    key,
                    content_type: "application/json".into(),
                },
                None,
            )
            .await?;
        return Ok(Json(serde_json::json!({
            "ok": false,
            "upload_url": presigned.url,
            "object_key": presigned.key,
        })));
    }

    let rows: Vec<ActivityLogRow> = body
        .entries
        .into_iter()
        .map(|entry| ActivityLogRow {
            session_id: body.session_id,
            timestamp_ms: entry.timestamp_ms,
            level: entry.level,
            category: entry.category,
            message: fl_core::sanitize(&entry.message),
            extra: entry.extra,
        })
        .collect();
    let inserted = state.intake.repos().logs.insert_batch(&rows).await?;
    Ok(Json(serde_json::json!({ "ok": true, "inserted": inserted })))
}

#[derive(Debug, Deserialize)]
pub struct BlobUploadedBody {
    pub session_id: SessionId,
    pub object_key: String,
}

/// The agent uploaded an oversized bundle; queue the fan-out task.
pub async fn blob_uploaded<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(agent): AgentAuth,
    Json(body): Json<BlobUploadedBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Reject keys outside the caller's tenant prefix.
    ObjectKey::parse_for_tenant(&body.object_key, agent.tenant_id)?;

    let envelope = WorkerEnvelope {
        task: TaskName::IngestLogBlob,
        session_id: body.session_id,
        args: serde_json::json!({
            "session_id": body.session_id,
            "object_key": body.object_key,
        }),
        dispatched_at_ms: state.intake.clock().epoch_ms(),
        session_version: 0,
    };
    state.intake.fast().push_worker(&envelope).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    pub session_id: SessionId,
    #[serde(default = "default_tail_limit")]
    pub limit: u32,
}

fn default_tail_limit() -> u32 {
    100
}

/// Latest log entries for a session, newest first.
pub async fn tail<C: Clock>(
    State(state): State<AppState<C>>,
    AgentAuth(_agent): AgentAuth,
    Query(query): Query<TailQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state
        .intake
        .repos()
        .logs
        .tail(&query.session_id, query.limit.min(1000))
        .await?;
    Ok(Json(serde_json::json!({ "entries": rows })))
}
