// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping session: the per-session state machine record.
//!
//! The record lives in the fast store (TTL two hours) and is mutated
//! only through the orchestrator's intake. Every accepted transition
//! bumps `version`; background-task completions carrying an older
//! version snapshot are discarded.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::FailCause;
use crate::id::{FormRouteId, NetworkId, ProjectId, SessionId, TenantId, TestPageId, UserId};
use crate::path::{PathConfig, PathTracker};
use crate::stage::{ExecutedStep, Stage};

/// What a session is mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    FormMapping,
    DynamicContentMapping,
    LogoutMapping,
}

crate::simple_display! {
    ActivityKind {
        FormMapping => "form_mapping",
        DynamicContentMapping => "dynamic_content_mapping",
        LogoutMapping => "logout_mapping",
    }
}

/// Session phases. Transitions are driven only by agent results,
/// background-task completions, and explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    LoginRequested,
    Navigating,
    NeedSteps,
    HaveSteps,
    ExecutingStep,
    VerifyingVisual,
    Recovering,
    Regenerating,
    VerifyingPage,
    EvaluatingPaths,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }

    /// Durable status string for the relational row.
    pub fn status_str(self) -> &'static str {
        match self {
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
            _ => "running",
        }
    }
}

crate::simple_display! {
    Phase {
        Created => "created",
        LoginRequested => "login_requested",
        Navigating => "navigating",
        NeedSteps => "need_steps",
        HaveSteps => "have_steps",
        ExecutingStep => "executing_step",
        VerifyingVisual => "verifying_visual",
        Recovering => "recovering",
        Regenerating => "regenerating",
        VerifyingPage => "verifying_page",
        EvaluatingPaths => "evaluating_paths",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Per-session tunables, snapshotted at creation so a config change
/// mid-session cannot skew a running mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub path: PathConfig,
    /// When set, AI prompts/responses are logged verbatim.
    pub debug_mode: bool,
    /// Wait before retrying after a page-general error.
    pub page_retry_wait_ms: u64,
    /// Bounded attempts for page-general errors.
    pub max_page_retries: u8,
    /// Bounded attempts for locator/correction fixes on one step.
    pub max_step_retries: u8,
    /// Overall recovery ceiling per session.
    pub max_recoveries: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathConfig::default(),
            debug_mode: false,
            page_retry_wait_ms: 60_000,
            max_page_retries: 2,
            max_step_retries: 2,
            max_recoveries: 6,
        }
    }
}

/// Form-route data snapshotted into the session at creation.
///
/// Credentials are NOT part of the snapshot; they are resolved from the
/// secret store when a login dispatch is materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub form_name: String,
    pub login_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_stages: Option<Vec<Stage>>,
    #[serde(default)]
    pub navigation_stages: Vec<Stage>,
    /// User-supplied input values keyed by field label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_inputs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_asset_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hints: Option<String>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub activity: ActivityKind,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
    pub form_route_id: Option<FormRouteId>,
    pub test_page_id: Option<TestPageId>,
    pub route: RouteSnapshot,
    pub base_url: String,
    pub test_case: Option<String>,
    pub config: SessionConfig,
}

/// The session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub activity: ActivityKind,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_route_id: Option<FormRouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_page_id: Option<TestPageId>,
    pub route: RouteSnapshot,
    pub base_url: String,
    /// Captured after a successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    /// Test-case description for dynamic-content sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<String>,

    pub phase: Phase,
    /// Index into `stages` of the next step to execute.
    pub step_index: usize,
    pub retry_count: u8,
    pub recovery_count: u8,
    pub parse_failures: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ai_decision: Option<String>,

    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub executed: Vec<ExecutedStep>,
    #[serde(default)]
    pub verified_fields: Vec<String>,
    /// Visual defects reported so far (fed back to the UI verifier so
    /// it only reports new ones).
    #[serde(default)]
    pub ui_issues: Vec<String>,
    /// Set when a recovery patched login/navigation/step stages; the
    /// recorder then writes the healed stages back to the route.
    #[serde(default)]
    pub stages_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healed_login_stages: Option<Vec<Stage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healed_nav_stages: Option<Vec<Stage>>,

    /// Step executed agent-side but awaiting a visual verdict before it
    /// is committed to the executed list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_step: Option<ExecutedStep>,

    /// Selector → option forced on the current path (junction seeding).
    #[serde(default)]
    pub overrides: IndexMap<String, String>,
    #[serde(default)]
    pub tracker: PathTracker,

    /// Strictly monotone; bumped on every accepted transition.
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_cause: Option<FailCause>,
    pub config: SessionConfig,

    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl SessionRecord {
    pub fn new(params: NewSession, clock: &impl Clock) -> Self {
        let now = clock.epoch_ms();
        Self {
            id: SessionId::new(),
            activity: params.activity,
            tenant_id: params.tenant_id,
            user_id: params.user_id,
            project_id: params.project_id,
            network_id: params.network_id,
            form_route_id: params.form_route_id,
            test_page_id: params.test_page_id,
            route: params.route,
            base_url: params.base_url,
            dashboard_url: None,
            test_case: params.test_case,
            phase: Phase::Created,
            step_index: 0,
            retry_count: 0,
            recovery_count: 0,
            parse_failures: 0,
            last_error: None,
            last_ai_decision: None,
            stages: Vec::new(),
            executed: Vec::new(),
            verified_fields: Vec::new(),
            ui_issues: Vec::new(),
            stages_updated: false,
            healed_login_stages: None,
            healed_nav_stages: None,
            pending_step: None,
            overrides: IndexMap::new(),
            tracker: PathTracker::default(),
            version: 0,
            fail_cause: None,
            config: params.config,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Bump the version and stamp the update time. Every accepted
    /// transition goes through here.
    pub fn touch(&mut self, now_ms: u64) {
        self.version += 1;
        self.updated_at_ms = now_ms;
    }

    /// Transition to `failed` with a structured cause.
    pub fn fail(&mut self, cause: FailCause, now_ms: u64) {
        self.last_error = Some(cause.message.clone());
        self.fail_cause = Some(cause);
        self.phase = Phase::Failed;
        self.touch(now_ms);
    }

    /// Transition to `cancelled`. Also bumps the version so in-flight
    /// task results are discarded at intake.
    pub fn cancel(&mut self, now_ms: u64) {
        self.phase = Phase::Cancelled;
        self.fail_cause = None;
        self.touch(now_ms);
    }

    /// The stage at the current step index, if any remain.
    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.get(self.step_index)
    }

    pub fn steps_remaining(&self) -> bool {
        self.step_index < self.stages.len()
    }

    /// Record an executed step and advance the index.
    pub fn record_executed(&mut self, step: ExecutedStep) {
        self.executed.push(step);
        self.step_index += 1;
        self.retry_count = 0;
    }

    /// Seed the next path: force the given junction options and reset
    /// execution state for a fresh form entry. The step list is kept;
    /// the replay re-runs it from the top with the overrides applied.
    ///
    /// Returns `false` when an override selector matches no known
    /// stage; the caller must fail the path rather than run it with a
    /// silently dropped override.
    pub fn seed_next_path(&mut self, instructions: IndexMap<String, String>) -> bool {
        let matched = instructions
            .keys()
            .all(|selector| self.stages.iter().any(|s| &s.selector == selector));
        if !matched || instructions.is_empty() {
            return false;
        }

        self.overrides = instructions;
        self.step_index = 0;
        self.executed.clear();
        self.pending_step = None;
        self.retry_count = 0;
        self.recovery_count = 0;
        self.parse_failures = 0;
        self.last_error = None;
        self.phase = Phase::Navigating;
        true
    }

    /// Re-check pending overrides after a recovery changed the step
    /// list. Fail closed: an override whose selector no longer matches
    /// any un-executed stage cannot be replayed faithfully.
    pub fn overrides_still_match(&self) -> bool {
        self.overrides.keys().all(|selector| {
            self.stages[self.step_index..]
                .iter()
                .any(|s| &s.selector == selector)
                || self.executed.iter().any(|e| &e.stage.selector == selector)
        })
    }

    /// Forced option for a stage, when the current path seeds one.
    pub fn override_for(&self, selector: &str) -> Option<&str> {
        self.overrides.get(selector).map(String::as_str)
    }
}

crate::builder! {
    pub struct SessionRecordBuilder => SessionRecord {
        into {
            id: SessionId = "sess-test",
            base_url: String = "https://app.example.com",
        }
        set {
            activity: ActivityKind = ActivityKind::FormMapping,
            tenant_id: TenantId = TenantId(1),
            user_id: UserId = UserId(1),
            project_id: ProjectId = ProjectId(1),
            network_id: NetworkId = NetworkId(1),
            route: RouteSnapshot = RouteSnapshot::default(),
            phase: Phase = Phase::Created,
            step_index: usize = 0,
            retry_count: u8 = 0,
            recovery_count: u8 = 0,
            parse_failures: u8 = 0,
            stages: Vec<Stage> = Vec::new(),
            executed: Vec<ExecutedStep> = Vec::new(),
            verified_fields: Vec<String> = Vec::new(),
            ui_issues: Vec<String> = Vec::new(),
            stages_updated: bool = false,
            overrides: IndexMap<String, String> = IndexMap::new(),
            tracker: PathTracker = PathTracker::default(),
            version: u64 = 0,
            config: SessionConfig = SessionConfig::default(),
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            form_route_id: FormRouteId = Some(FormRouteId(1)),
            test_page_id: TestPageId = None,
            dashboard_url: String = None,
            test_case: String = None,
            last_error: String = None,
            last_ai_decision: String = None,
            healed_login_stages: Vec<Stage> = None,
            healed_nav_stages: Vec<Stage> = None,
            pending_step: ExecutedStep = None,
            fail_cause: FailCause = None,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
