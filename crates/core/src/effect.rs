// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects the orchestrator asks its caller to perform.
//!
//! The orchestrator itself is pure: it mutates the session record and
//! returns effects. The intake layer executes them against the queue
//! fabric and the relational store after the record is persisted.

use serde::{Deserialize, Serialize};

use crate::error::FailCause;
use crate::id::{SessionId, UserId};
use crate::session::Phase;
use crate::stage::Stage;
use crate::task::WorkerEnvelope;

/// What to send to the session's agent next.
///
/// `Login` carries no credentials; the executor resolves them from the
/// secret store when the task is materialized so plaintext never sits
/// in a session record or an effect log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentDispatch {
    Login,
    NavigateToForm { start_url: String, stages: Vec<Stage> },
    ExecStep { step: Stage },
    ExtractDom,
    Logout { stages: Vec<Stage> },
}

impl AgentDispatch {
    pub fn name(&self) -> &'static str {
        match self {
            AgentDispatch::Login => "login",
            AgentDispatch::NavigateToForm { .. } => "navigate_to_form",
            AgentDispatch::ExecStep { .. } => "exec_step",
            AgentDispatch::ExtractDom => "extract_dom",
            AgentDispatch::Logout { .. } => "logout",
        }
    }
}

/// Effects that need to be executed after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Create an agent task and push it onto the owner's queue.
    /// `delay_ms` routes through the delayed set (page-error retries).
    DispatchAgent {
        user_id: UserId,
        dispatch: AgentDispatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },

    /// Enqueue a background task on its worker queue.
    EnqueueWorker { envelope: WorkerEnvelope },

    /// Write the session's durable status through to the relational row.
    SyncStatus {
        session_id: SessionId,
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<FailCause>,
    },
}

impl Effect {
    /// Effect name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::DispatchAgent { .. } => "dispatch_agent",
            Effect::EnqueueWorker { .. } => "enqueue_worker",
            Effect::SyncStatus { .. } => "sync_status",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::DispatchAgent { user_id, dispatch, delay_ms } => {
                let mut fields = vec![
                    ("user_id", user_id.to_string()),
                    ("dispatch", dispatch.name().to_string()),
                ];
                if let Some(ms) = delay_ms {
                    fields.push(("delay_ms", ms.to_string()));
                }
                fields
            }
            Effect::EnqueueWorker { envelope } => vec![
                ("task", envelope.task.to_string()),
                ("session_id", envelope.session_id.to_string()),
                ("version", envelope.session_version.to_string()),
            ],
            Effect::SyncStatus { session_id, phase, .. } => vec![
                ("session_id", session_id.to_string()),
                ("phase", phase.to_string()),
            ],
        }
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
