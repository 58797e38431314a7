// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task envelopes: agent tasks and background worker tasks.
//!
//! Queues carry compact envelopes; the authoritative task record lives
//! in the relational store. A queue entry without a matching row is
//! dropped at poll time.

use serde::{Deserialize, Serialize};

use crate::id::{AgentId, SessionId, TaskId, TenantId, UserId};
use crate::stage::Stage;

/// Named background queues, one per worker class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerQueue {
    /// Form-mapping AI tasks.
    Mapper,
    /// Test-run verification tasks.
    Runner,
    /// Persistence and log fan-out tasks.
    Forms,
}

impl WorkerQueue {
    /// Fast-store list key for this queue.
    pub fn key(self) -> &'static str {
        match self {
            WorkerQueue::Mapper => "work:mapper",
            WorkerQueue::Runner => "work:runner",
            WorkerQueue::Forms => "work:forms",
        }
    }

    pub const ALL: [WorkerQueue; 3] =
        [WorkerQueue::Mapper, WorkerQueue::Runner, WorkerQueue::Forms];
}

crate::simple_display! {
    WorkerQueue {
        Mapper => "mapper",
        Runner => "runner",
        Forms => "forms",
    }
}

/// Background task types in the mapping flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    AnalyzeFormPage,
    RegenerateSteps,
    AnalyzeFailureAndRecover,
    VerifyUiVisual,
    VerifyPageVisual,
    VerifyDynamicStepVisual,
    EvaluatePaths,
    SaveMappingResult,
    IngestLogBlob,
}

impl TaskName {
    /// Which worker class consumes this task.
    pub fn queue(self) -> WorkerQueue {
        match self {
            TaskName::AnalyzeFormPage
            | TaskName::RegenerateSteps
            | TaskName::AnalyzeFailureAndRecover
            | TaskName::EvaluatePaths => WorkerQueue::Mapper,
            TaskName::VerifyUiVisual
            | TaskName::VerifyPageVisual
            | TaskName::VerifyDynamicStepVisual => WorkerQueue::Runner,
            TaskName::SaveMappingResult | TaskName::IngestLogBlob => WorkerQueue::Forms,
        }
    }

    /// Tasks that call the model pass the budget gate first. Path
    /// evaluation is a deterministic heuristic over the tracker;
    /// persistence and log fan-out never touch the model.
    pub fn calls_ai(self) -> bool {
        !matches!(
            self,
            TaskName::EvaluatePaths | TaskName::SaveMappingResult | TaskName::IngestLogBlob
        )
    }
}

crate::simple_display! {
    TaskName {
        AnalyzeFormPage => "analyze_form_page",
        RegenerateSteps => "regenerate_steps",
        AnalyzeFailureAndRecover => "analyze_failure_and_recover",
        VerifyUiVisual => "verify_ui_visual",
        VerifyPageVisual => "verify_page_visual",
        VerifyDynamicStepVisual => "verify_dynamic_step_visual",
        EvaluatePaths => "evaluate_paths",
        SaveMappingResult => "save_mapping_result",
        IngestLogBlob => "ingest_log_blob",
    }
}

/// Envelope pushed onto a background queue.
///
/// `session_version` is snapshotted at dispatch; intake discards the
/// completion if the session has since moved on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    pub task: TaskName,
    pub session_id: SessionId,
    #[serde(default)]
    pub args: serde_json::Value,
    pub dispatched_at_ms: u64,
    pub session_version: u64,
}

/// Agent task kinds (tag-only, for records and routing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTaskKind {
    Login,
    NavigateToForm,
    ExecStep,
    ExecSteps,
    ExtractDom,
    Logout,
}

crate::simple_display! {
    AgentTaskKind {
        Login => "login",
        NavigateToForm => "navigate_to_form",
        ExecStep => "exec_step",
        ExecSteps => "exec_steps",
        ExtractDom => "extract_dom",
        Logout => "logout",
    }
}

/// Typed parameters for one agent task.
///
/// Serializes with `{"task_type": "...", ...fields}`, the shape the
/// agent receives from `poll-task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum AgentTaskParams {
    Login {
        login_url: String,
        username: String,
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        totp_seed: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hints: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stages: Option<Vec<Stage>>,
    },
    NavigateToForm {
        start_url: String,
        stages: Vec<Stage>,
    },
    ExecStep {
        step: Stage,
    },
    ExecSteps {
        steps: Vec<Stage>,
    },
    ExtractDom {},
    Logout {
        stages: Vec<Stage>,
    },
}

impl AgentTaskParams {
    pub fn kind(&self) -> AgentTaskKind {
        match self {
            AgentTaskParams::Login { .. } => AgentTaskKind::Login,
            AgentTaskParams::NavigateToForm { .. } => AgentTaskKind::NavigateToForm,
            AgentTaskParams::ExecStep { .. } => AgentTaskKind::ExecStep,
            AgentTaskParams::ExecSteps { .. } => AgentTaskKind::ExecSteps,
            AgentTaskParams::ExtractDom {} => AgentTaskKind::ExtractDom,
            AgentTaskParams::Logout { .. } => AgentTaskKind::Logout,
        }
    }
}

/// Result payload of a `login` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_stages: Option<Vec<Stage>>,
}

/// Result payload of a `navigate_to_form` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_stages: Option<Vec<Stage>>,
}

/// Result payload of an `exec_step` task.
///
/// The agent never ships screenshot bytes inline; `screenshot_key`
/// references an object it uploaded through a presigned URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStepOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_changed_hint: Option<bool>,
}

/// Result payload of an `extract_dom` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub dom_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
}

/// Result payload of a `logout` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_stages: Option<Vec<Stage>>,
}

/// Lifecycle of an agent task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    AgentTaskStatus {
        Pending => "pending",
        Assigned => "assigned",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Authoritative agent-task record (relational store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskRecord {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    /// Owning agent; None until picked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub params: AgentTaskParams,
    pub status: AgentTaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session that dispatched this task, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl AgentTaskRecord {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        params: AgentTaskParams,
        session_id: Option<SessionId>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: TaskId::new(),
            tenant_id,
            user_id,
            agent_id: None,
            params,
            status: AgentTaskStatus::Pending,
            result: None,
            error: None,
            session_id,
            created_at_ms: now_ms,
            started_at_ms: None,
            completed_at_ms: None,
        }
    }
}

/// Compact pointer pushed onto a per-user agent queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentQueueMessage {
    pub task_id: TaskId,
    pub task_type: AgentTaskKind,
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
