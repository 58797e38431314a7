// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-scoped structured logging.
//!
//! Every record carries the session context and passes through the
//! sanitizer. JSON output shape is configured once at startup by the
//! binary (tracing-subscriber with the `json` formatter).

use serde::{Deserialize, Serialize};

use crate::id::{SessionId, TenantId, UserId};
use crate::sanitize::sanitize;
use crate::session::{ActivityKind, Phase};

/// Coarse log categories, used for filtering the activity tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Session,
    StateMachine,
    AgentComm,
    WorkerTask,
    StepExecution,
    Recovery,
    Milestone,
    Error,
}

crate::simple_display! {
    LogCategory {
        Session => "session",
        StateMachine => "state_machine",
        AgentComm => "agent_comm",
        WorkerTask => "worker_task",
        StepExecution => "step_execution",
        Recovery => "recovery",
        Milestone => "milestone",
        Error => "error",
    }
}

/// Logger bound to one session's context.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: SessionId,
    tenant_id: TenantId,
    user_id: UserId,
    activity: ActivityKind,
    debug_mode: bool,
}

impl SessionLogger {
    pub fn new(
        session_id: SessionId,
        tenant_id: TenantId,
        user_id: UserId,
        activity: ActivityKind,
        debug_mode: bool,
    ) -> Self {
        Self { session_id, tenant_id, user_id, activity, debug_mode }
    }

    pub fn info(&self, category: LogCategory, message: &str) {
        tracing::info!(
            session_id = %self.session_id,
            tenant_id = %self.tenant_id,
            user_id = %self.user_id,
            activity = %self.activity,
            category = %category,
            "{}",
            sanitize(message)
        );
    }

    pub fn warn(&self, category: LogCategory, message: &str) {
        tracing::warn!(
            session_id = %self.session_id,
            tenant_id = %self.tenant_id,
            user_id = %self.user_id,
            activity = %self.activity,
            category = %category,
            "{}",
            sanitize(message)
        );
    }

    pub fn error(&self, category: LogCategory, message: &str) {
        tracing::error!(
            session_id = %self.session_id,
            tenant_id = %self.tenant_id,
            user_id = %self.user_id,
            activity = %self.activity,
            category = %category,
            "{}",
            sanitize(message)
        );
    }

    pub fn state_transition(&self, from: Phase, to: Phase) {
        self.info(
            LogCategory::StateMachine,
            &format!("state transition: {from} -> {to}"),
        );
    }

    pub fn agent_task_pushed(&self, kind: &str) {
        self.info(LogCategory::AgentComm, &format!("agent task pushed: {kind}"));
    }

    pub fn agent_result(&self, kind: &str, success: bool) {
        self.info(
            LogCategory::AgentComm,
            &format!("agent result: {kind} success={success}"),
        );
    }

    pub fn worker_failed(&self, task: &str, error: &str) {
        self.error(
            LogCategory::WorkerTask,
            &format!("background task {task} failed: {error}"),
        );
    }

    pub fn step_executing(&self, step_number: u32, action: &str, selector: &str) {
        self.info(
            LogCategory::StepExecution,
            &format!("executing step {step_number}: {action} {selector}"),
        );
    }

    /// Verbatim prompt/response logging, gated on the tenant flag.
    /// Still sanitized: debug mode widens what is logged, never what
    /// is scrubbed.
    pub fn ai_exchange(&self, prompt: &str, response: &str) {
        if !self.debug_mode {
            return;
        }
        tracing::debug!(
            session_id = %self.session_id,
            tenant_id = %self.tenant_id,
            category = %LogCategory::WorkerTask,
            prompt = %sanitize(prompt),
            response = %sanitize(response),
            "ai exchange"
        );
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }
}
