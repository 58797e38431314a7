// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery-path transitions.

use super::*;
use fl_core::RecoveryDecision;

fn failing_step_result() -> SessionEvent {
    SessionEvent::AgentResult {
        task_id: TaskId::from_string("task-1"),
        kind: AgentTaskKind::ExecStep,
        success: false,
        result: Some(serde_json::json!({
            "success": false,
            "error": "no element matches #save",
            "dom_html": "<form><button id='save-btn'/></form>",
            "screenshot_key": "screenshots/1/1/sess-test/fail.png",
        })),
        error: None,
    }
}

fn recovery(decision: RecoveryDecision) -> SessionEvent {
    SessionEvent::WorkerDone {
        task: TaskName::AnalyzeFailureAndRecover,
        output: WorkerOutput::Recovery { decision },
    }
}

fn record_with_failing_step() -> SessionRecord {
    let mut record = record_in(Phase::ExecutingStep);
    record.stages = vec![
        Stage::new(1, StepAction::Click, "#save").description("save the record"),
        fill_stage(2, "#next"),
    ];
    record
}

#[test]
fn step_failure_routes_to_the_classifier() {
    let mut record = record_with_failing_step();
    let effects = advance(&mut record, failing_step_result(), NOW);
    assert_eq!(record.phase, Phase::Recovering);
    assert_eq!(record.recovery_count, 1);
    match &effects[0] {
        Effect::EnqueueWorker { envelope } => {
            assert_eq!(envelope.task, TaskName::AnalyzeFailureAndRecover);
            assert_eq!(envelope.args["step"]["selector"], "#save");
            assert_eq!(envelope.args["error"], "no element matches #save");
        }
        other => panic!("expected recovery enqueue, got {other:?}"),
    }
}

#[test]
fn locator_fix_patches_the_step_in_place() {
    let mut record = record_with_failing_step();
    advance(&mut record, failing_step_result(), NOW);

    let effects = advance(
        &mut record,
        recovery(RecoveryDecision::LocatorChanged {
            new_selector: "#save-btn".into(),
            new_xpath: None,
        }),
        NOW,
    );
    assert_eq!(record.phase, Phase::ExecutingStep);
    assert_eq!(record.stages[0].selector, "#save-btn");
    assert!(record.stages_updated);
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => assert_eq!(step.selector, "#save-btn"),
        other => panic!("expected retry dispatch, got {other:?}"),
    }

    // The retried step succeeds; the durable step list carries the fix.
    advance(
        &mut record,
        agent_result(AgentTaskKind::ExecStep, true, step_ok(false)),
        NOW,
    );
    assert_eq!(record.executed[0].stage.selector, "#save-btn");
}

#[test]
fn locator_fixes_are_bounded() {
    let mut record = record_with_failing_step();
    record.retry_count = record.config.max_step_retries;
    advance(&mut record, failing_step_result(), NOW);
    advance(
        &mut record,
        recovery(RecoveryDecision::LocatorChanged {
            new_selector: "#save-v2".into(),
            new_xpath: None,
        }),
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::RecoveryExhausted
    );
}

#[test]
fn page_general_error_waits_before_retrying() {
    let mut record = record_with_failing_step();
    advance(&mut record, failing_step_result(), NOW);

    let effects = advance(&mut record, recovery(RecoveryDecision::PageGeneralError), NOW);
    match &effects[0] {
        Effect::DispatchAgent { delay_ms, .. } => {
            assert_eq!(*delay_ms, Some(record.config.page_retry_wait_ms));
        }
        other => panic!("expected delayed dispatch, got {other:?}"),
    }
}

#[test]
fn page_general_error_is_bounded() {
    let mut record = record_with_failing_step();
    record.retry_count = record.config.max_page_retries;
    advance(&mut record, failing_step_result(), NOW);
    advance(&mut record, recovery(RecoveryDecision::PageGeneralError), NOW);
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::PageUnavailable
    );
}

#[test]
fn need_healing_pulls_fresh_dom_then_regenerates() {
    let mut record = record_with_failing_step();
    advance(&mut record, failing_step_result(), NOW);

    let effects = advance(&mut record, recovery(RecoveryDecision::NeedHealing), NOW);
    assert_eq!(record.phase, Phase::Regenerating);
    assert!(matches!(expect_dispatch(&effects), AgentDispatch::ExtractDom));

    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::ExtractDom,
            true,
            serde_json::json!({"dom_html": "<form v2/>"}),
        ),
        NOW,
    );
    assert_eq!(expect_enqueue(&effects), TaskName::RegenerateSteps);
}

#[test]
fn regenerated_steps_splice_behind_executed_prefix() {
    let mut record = record_with_failing_step();
    record.executed = vec![fl_core::ExecutedStep::plain(record.stages[0].clone())];
    record.step_index = 1;
    record.phase = Phase::Regenerating;

    advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::RegenerateSteps,
            output: WorkerOutput::Steps {
                stages: vec![fill_stage(1, "#email"), fill_stage(2, "#phone")],
            },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::ExecutingStep);
    assert_eq!(record.stages.len(), 3);
    assert_eq!(record.step_index, 1);
    assert_eq!(record.stages[1].selector, "#email");
    // Renumbered over the whole list.
    assert_eq!(record.stages[2].step_number, 3);
}

#[test]
fn correction_steps_splice_before_the_failing_step() {
    let mut record = record_with_failing_step();
    advance(&mut record, failing_step_result(), NOW);

    let effects = advance(
        &mut record,
        recovery(RecoveryDecision::CorrectionSteps {
            pre_steps: vec![Stage::new(1, StepAction::Click, "#expand-section")
                .description("expand the collapsed section")],
            replacement: None,
        }),
        NOW,
    );
    assert_eq!(record.stages.len(), 3);
    assert_eq!(record.stages[0].selector, "#expand-section");
    assert_eq!(record.stages[1].selector, "#save");
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => assert_eq!(step.selector, "#expand-section"),
        other => panic!("expected spliced step dispatch, got {other:?}"),
    }
}

#[test]
fn recovery_after_override_loss_fails_closed() {
    let mut record = record_with_failing_step();
    record
        .overrides
        .insert("#country".to_string(), "FR".to_string());
    advance(&mut record, failing_step_result(), NOW);

    // The correction rewrites the remaining steps; the forced junction
    // selector no longer exists anywhere.
    record.stages = vec![Stage::new(1, StepAction::Click, "#other")];
    record.step_index = 0;
    advance(
        &mut record,
        recovery(RecoveryDecision::LocatorChanged {
            new_selector: "#other-v2".into(),
            new_xpath: None,
        }),
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::JunctionOverrideLost
    );
}

#[test]
fn recovery_budget_exhaustion_is_terminal() {
    let mut record = record_with_failing_step();
    record.recovery_count = record.config.max_recoveries;
    advance(&mut record, failing_step_result(), NOW);
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::RecoveryExhausted
    );
}

#[test]
fn parse_failure_triggers_one_regeneration_then_fails() {
    let mut record = record_in(Phase::NeedSteps);
    let parse_failed = || SessionEvent::WorkerDone {
        task: TaskName::AnalyzeFormPage,
        output: WorkerOutput::Failed {
            cause: fl_core::FailCause::new(FailCode::AiParseError, "no JSON in output"),
        },
    };

    let effects = advance(&mut record, parse_failed(), NOW);
    assert_eq!(record.phase, Phase::NeedSteps);
    assert_eq!(record.parse_failures, 1);
    assert!(matches!(expect_dispatch(&effects), AgentDispatch::ExtractDom));

    advance(&mut record, parse_failed(), NOW);
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(record.fail_cause.as_ref().unwrap().code, FailCode::AiParseError);
}
