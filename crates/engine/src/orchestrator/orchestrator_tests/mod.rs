// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod paths;
mod recovery;

use fl_core::{
    ActivityKind, AgentDispatch, AgentTaskKind, Effect, FailCode, JunctionInfo, Phase,
    RouteSnapshot, SessionEvent, SessionRecord, Stage, StepAction, TaskId, TaskName, WorkerOutput,
};

use super::{advance, kickoff};

pub(crate) const NOW: u64 = 1_000_000;

pub(crate) fn record_in(phase: Phase) -> SessionRecord {
    let mut record = SessionRecord::builder()
        .phase(phase)
        .route(RouteSnapshot {
            form_name: "customer".into(),
            login_url: "https://app.example.com/login".into(),
            navigation_stages: vec![Stage::new(1, StepAction::Click, "#menu-customers")],
            ..RouteSnapshot::default()
        })
        .build();
    record.version = 1;
    record
}

pub(crate) fn agent_result(
    kind: AgentTaskKind,
    success: bool,
    result: serde_json::Value,
) -> SessionEvent {
    SessionEvent::AgentResult {
        task_id: TaskId::from_string("task-1"),
        kind,
        success,
        result: Some(result),
        error: None,
    }
}

pub(crate) fn fill_stage(n: u32, selector: &str) -> Stage {
    Stage::new(n, StepAction::Fill, selector)
        .value("x")
        .description(format!("fill {selector}"))
}

pub(crate) fn junction_stage(n: u32, selector: &str, name: &str, options: &[&str]) -> Stage {
    Stage::new(n, StepAction::Select, selector)
        .description(format!("choose {name}"))
        .junction(JunctionInfo::new(
            name,
            options.iter().map(|o| o.to_string()).collect(),
        ))
}

pub(crate) fn step_ok(fields_changed: bool) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "dom_html": "<form/>",
        "screenshot_key": "screenshots/1/1/sess-test/step.png",
        "fields_changed_hint": fields_changed,
    })
}

pub(crate) fn expect_dispatch(effects: &[Effect]) -> &AgentDispatch {
    match effects {
        [Effect::DispatchAgent { dispatch, .. }] => dispatch,
        other => panic!("expected one DispatchAgent, got {other:?}"),
    }
}

pub(crate) fn expect_enqueue(effects: &[Effect]) -> TaskName {
    match effects {
        [Effect::EnqueueWorker { envelope }] => envelope.task,
        other => panic!("expected one EnqueueWorker, got {other:?}"),
    }
}

#[test]
fn kickoff_dispatches_login() {
    let mut record = record_in(Phase::Created);
    let effects = kickoff(&mut record, NOW);
    assert_eq!(record.phase, Phase::LoginRequested);
    assert_eq!(record.version, 2);
    assert!(matches!(expect_dispatch(&effects), AgentDispatch::Login));
}

#[test]
fn login_success_moves_to_navigation() {
    let mut record = record_in(Phase::LoginRequested);
    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::Login,
            true,
            serde_json::json!({"success": true, "dashboard_url": "https://app.example.com/home"}),
        ),
        NOW,
    );
    assert_eq!(record.phase, Phase::Navigating);
    assert_eq!(record.dashboard_url.as_deref(), Some("https://app.example.com/home"));
    match expect_dispatch(&effects) {
        AgentDispatch::NavigateToForm { start_url, .. } => {
            assert_eq!(start_url, "https://app.example.com/home");
        }
        other => panic!("expected navigate, got {other:?}"),
    }
}

#[test]
fn login_failure_fails_the_session() {
    let mut record = record_in(Phase::LoginRequested);
    let effects = advance(
        &mut record,
        SessionEvent::AgentResult {
            task_id: TaskId::from_string("task-1"),
            kind: AgentTaskKind::Login,
            success: false,
            result: None,
            error: Some("bad credentials".into()),
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(record.fail_cause.as_ref().unwrap().code, FailCode::AgentError);
    assert!(matches!(effects[0], Effect::SyncStatus { .. }));
}

#[test]
fn healed_login_stages_mark_the_route_dirty() {
    let mut record = record_in(Phase::LoginRequested);
    let healed = vec![fill_stage(1, "#user"), fill_stage(2, "#pass")];
    advance(
        &mut record,
        agent_result(
            AgentTaskKind::Login,
            true,
            serde_json::json!({"success": true, "final_stages": healed}),
        ),
        NOW,
    );
    assert!(record.stages_updated);
    assert_eq!(record.healed_login_stages.as_ref().unwrap().len(), 2);
}

#[test]
fn navigation_success_requests_dom() {
    let mut record = record_in(Phase::Navigating);
    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::NavigateToForm,
            true,
            serde_json::json!({"success": true, "current_url": "https://app.example.com/customers/new"}),
        ),
        NOW,
    );
    assert_eq!(record.phase, Phase::NeedSteps);
    assert!(matches!(expect_dispatch(&effects), AgentDispatch::ExtractDom));
}

#[test]
fn dom_snapshot_enqueues_analysis_with_overrides() {
    let mut record = record_in(Phase::NeedSteps);
    record
        .overrides
        .insert("#country".to_string(), "FR".to_string());
    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::ExtractDom,
            true,
            serde_json::json!({"dom_html": "<form/>", "screenshot_key": "screenshots/1/1/sess-test/page.png"}),
        ),
        NOW,
    );
    match &effects[0] {
        Effect::EnqueueWorker { envelope } => {
            assert_eq!(envelope.task, TaskName::AnalyzeFormPage);
            assert_eq!(envelope.session_version, record.version);
            assert_eq!(envelope.args["junction_instructions"]["#country"], "FR");
        }
        other => panic!("expected enqueue, got {other:?}"),
    }
}

#[test]
fn generated_steps_start_execution() {
    let mut record = record_in(Phase::NeedSteps);
    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::AnalyzeFormPage,
            output: WorkerOutput::Steps {
                stages: vec![fill_stage(9, "#name"), fill_stage(22, "#email")],
            },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::ExecutingStep);
    // Steps renumbered from 1 regardless of model numbering.
    assert_eq!(record.stages[0].step_number, 1);
    assert_eq!(record.stages[1].step_number, 2);
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => assert_eq!(step.selector, "#name"),
        other => panic!("expected exec, got {other:?}"),
    }
}

#[test]
fn successful_steps_advance_to_page_verify() {
    let mut record = record_in(Phase::ExecutingStep);
    record.stages = vec![fill_stage(1, "#name")];

    let effects = advance(
        &mut record,
        agent_result(AgentTaskKind::ExecStep, true, step_ok(false)),
        NOW,
    );
    // Last step done: capture the result page.
    assert_eq!(record.phase, Phase::VerifyingPage);
    assert_eq!(record.executed.len(), 1);
    assert!(matches!(expect_dispatch(&effects), AgentDispatch::ExtractDom));
}

#[test]
fn alert_step_failure_advances_silently() {
    let mut record = record_in(Phase::ExecutingStep);
    record.stages = vec![
        Stage::new(1, StepAction::AcceptAlert, "").description("accept alert"),
        fill_stage(2, "#name"),
    ];

    let effects = advance(
        &mut record,
        SessionEvent::AgentResult {
            task_id: TaskId::from_string("task-1"),
            kind: AgentTaskKind::ExecStep,
            success: false,
            result: None,
            error: Some("no alert present".into()),
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::ExecutingStep);
    assert_eq!(record.executed.len(), 1);
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => assert_eq!(step.selector, "#name"),
        other => panic!("expected exec of next step, got {other:?}"),
    }
}

#[test]
fn verify_step_failure_is_terminal() {
    let mut record = record_in(Phase::ExecutingStep);
    record.stages = vec![Stage::new(1, StepAction::Verify, "").description("total shown")];

    advance(
        &mut record,
        SessionEvent::AgentResult {
            task_id: TaskId::from_string("task-1"),
            kind: AgentTaskKind::ExecStep,
            success: false,
            result: None,
            error: Some("total not visible".into()),
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::VerificationFailed
    );
}

#[test]
fn cancel_bumps_version_and_syncs() {
    let mut record = record_in(Phase::ExecutingStep);
    let version = record.version;
    let effects = advance(&mut record, SessionEvent::Cancel, NOW);
    assert_eq!(record.phase, Phase::Cancelled);
    assert_eq!(record.version, version + 1);
    assert!(matches!(
        effects[0],
        Effect::SyncStatus { phase: Phase::Cancelled, .. }
    ));
}

#[test]
fn terminal_sessions_discard_all_inputs() {
    let mut record = record_in(Phase::Cancelled);
    let version = record.version;
    let effects = advance(
        &mut record,
        agent_result(AgentTaskKind::ExecStep, true, step_ok(false)),
        NOW,
    );
    assert!(effects.is_empty());
    assert_eq!(record.version, version);
}

#[test]
fn timeout_fails_with_structured_cause() {
    let mut record = record_in(Phase::HaveSteps);
    advance(&mut record, SessionEvent::Timeout, NOW);
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(record.fail_cause.as_ref().unwrap().code, FailCode::Timeout);
}

#[test]
fn mismatched_phase_input_is_discarded() {
    let mut record = record_in(Phase::NeedSteps);
    let effects = advance(
        &mut record,
        agent_result(AgentTaskKind::Login, true, serde_json::json!({"success": true})),
        NOW,
    );
    assert!(effects.is_empty());
    assert_eq!(record.phase, Phase::NeedSteps);
}

#[test]
fn logout_mapping_saves_after_logout() {
    let mut record = record_in(Phase::LoginRequested);
    record.activity = ActivityKind::LogoutMapping;
    let effects = advance(
        &mut record,
        agent_result(AgentTaskKind::Login, true, serde_json::json!({"success": true})),
        NOW,
    );
    assert!(matches!(
        expect_dispatch(&effects),
        AgentDispatch::Logout { .. }
    ));

    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::Logout,
            true,
            serde_json::json!({"success": true, "final_stages": [fill_stage(1, "#logout")]}),
        ),
        NOW,
    );
    assert_eq!(expect_enqueue(&effects), TaskName::SaveMappingResult);

    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::SaveMappingResult,
            output: WorkerOutput::Saved { result_id: fl_core::ResultId(1), path_number: 1 },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Completed);
    assert!(matches!(effects[0], Effect::SyncStatus { .. }));
}
