// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator inputs: the only three things that drive transitions.
//!
//! Serializes with `{"type": "source:kind", ...fields}` so intake
//! events can be logged and replayed verbatim.

use serde::{Deserialize, Serialize};

use crate::error::FailCause;
use crate::id::TaskId;
use crate::path::PathDecision;
use crate::stage::Stage;
use crate::task::{AgentTaskKind, TaskName};

/// An input entering the orchestrator for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// An agent posted a task result.
    #[serde(rename = "agent:result")]
    AgentResult {
        task_id: TaskId,
        kind: AgentTaskKind,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A background task completed and re-enters the state machine.
    #[serde(rename = "task:done")]
    WorkerDone { task: TaskName, output: WorkerOutput },

    /// User-issued cancellation.
    #[serde(rename = "session:cancel")]
    Cancel,

    /// Sweeper found the session past its lifetime.
    #[serde(rename = "session:timeout")]
    Timeout,
}

impl SessionEvent {
    /// Short label for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::AgentResult { .. } => "agent_result",
            SessionEvent::WorkerDone { .. } => "worker_done",
            SessionEvent::Cancel => "cancel",
            SessionEvent::Timeout => "timeout",
        }
    }
}

/// Typed output of a background task, fed back through intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerOutput {
    /// `analyze_form_page` / `regenerate_steps`: an ordered step list.
    Steps { stages: Vec<Stage> },

    /// `analyze_failure_and_recover`: what to do about a failing step.
    Recovery { decision: RecoveryDecision },

    /// `verify_ui_visual`: newly observed visual defects (empty = clean).
    UiVisual { new_issues: String },

    /// `verify_page_visual`: per-field verdicts on the result page.
    PageVerdict {
        ready: bool,
        #[serde(default)]
        failures: Vec<FieldVerdict>,
    },

    /// `verify_dynamic_step_visual`: screenshot-only verify-step check.
    StepVisual {
        passed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocking_issue: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// `evaluate_paths`: the path evaluator's decision, plus the
    /// tracker it annotated (nesting links) for write-back.
    Paths {
        decision: PathDecision,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tracker: Option<crate::path::PathTracker>,
    },

    /// `save_mapping_result`: the durable row landed.
    Saved {
        result_id: crate::id::ResultId,
        path_number: u32,
    },

    /// The worker's outermost frame converted a failure into structure.
    Failed { cause: FailCause },
}

/// Recovery classifier outcome for a failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryDecision {
    /// The locator drifted; retry the same step with a new selector.
    LocatorChanged {
        new_selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_xpath: Option<String>,
    },
    /// 404 / blank page / network unreachable: wait and retry, bounded.
    PageGeneralError,
    /// The remaining steps no longer fit the page; regenerate them.
    NeedHealing,
    /// Splice pre-steps before the failing step, optionally replacing it.
    CorrectionSteps {
        pre_steps: Vec<Stage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replacement: Option<Stage>,
    },
}

crate::simple_display! {
    RecoveryDecision {
        LocatorChanged { .. } => "locator_changed",
        PageGeneralError => "page_general_error",
        NeedHealing => "need_healing",
        CorrectionSteps { .. } => "correction_steps",
    }
}

/// Severity of a page-verification finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One field's pass/fail on the result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldVerdict {
    pub field: String,
    pub passed: bool,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
