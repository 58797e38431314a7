// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path commit, evaluation, and seeding transitions.

use super::*;
use fl_core::{FieldVerdict, PathDecision, ResultId, Severity};
use indexmap::IndexMap;

fn executed_junction_path(record: &mut SessionRecord) {
    record.stages = vec![
        fill_stage(1, "#name"),
        junction_stage(2, "#country", "country", &["FR", "DE"]),
    ];
    record.executed = record
        .stages
        .iter()
        .cloned()
        .map(|mut stage| {
            if stage.is_junction {
                if let Some(info) = stage.junction_info.as_mut() {
                    info.chosen_option = Some("FR".into());
                }
            }
            fl_core::ExecutedStep { stage, fields_changed: false }
        })
        .collect();
    record.step_index = 2;
}

fn page_verdict(ready: bool, failures: Vec<FieldVerdict>) -> SessionEvent {
    SessionEvent::WorkerDone {
        task: TaskName::VerifyPageVisual,
        output: WorkerOutput::PageVerdict { ready, failures },
    }
}

#[test]
fn page_verify_pass_commits_the_path() {
    let mut record = record_in(Phase::VerifyingPage);
    executed_junction_path(&mut record);

    let effects = advance(
        &mut record,
        page_verdict(
            true,
            vec![FieldVerdict {
                field: "name".into(),
                passed: true,
                severity: Severity::Low,
                detail: None,
            }],
        ),
        NOW,
    );
    assert_eq!(expect_enqueue(&effects), TaskName::SaveMappingResult);
    assert!(record.verified_fields.contains(&"name".to_string()));
}

#[test]
fn page_not_ready_retries_with_delay() {
    let mut record = record_in(Phase::VerifyingPage);
    executed_junction_path(&mut record);

    let effects = advance(&mut record, page_verdict(false, Vec::new()), NOW);
    match &effects[0] {
        fl_core::Effect::DispatchAgent { dispatch, delay_ms, .. } => {
            assert!(matches!(dispatch, AgentDispatch::ExtractDom));
            assert!(delay_ms.is_some());
        }
        other => panic!("expected delayed dom dispatch, got {other:?}"),
    }
}

#[test]
fn high_severity_failure_is_terminal() {
    let mut record = record_in(Phase::VerifyingPage);
    executed_junction_path(&mut record);

    advance(
        &mut record,
        page_verdict(
            true,
            vec![FieldVerdict {
                field: "email".into(),
                passed: false,
                severity: Severity::High,
                detail: Some("value missing".into()),
            }],
        ),
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::VerificationFailed
    );
}

#[test]
fn saved_path_lands_in_the_tracker_and_evaluates() {
    let mut record = record_in(Phase::VerifyingPage);
    executed_junction_path(&mut record);

    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::SaveMappingResult,
            output: WorkerOutput::Saved { result_id: ResultId(11), path_number: 1 },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::EvaluatingPaths);
    assert_eq!(expect_enqueue(&effects), TaskName::EvaluatePaths);

    let path = &record.tracker.completed[0];
    assert_eq!(path.path_number, 1);
    assert_eq!(path.result_id, Some(ResultId(11)));
    assert_eq!(
        path.junction_choices[&fl_core::JunctionId::from_name("country")],
        "FR"
    );
    assert_eq!(path.junction_steps[0].selector, "#country");
}

#[test]
fn evaluation_done_completes_the_session() {
    let mut record = record_in(Phase::EvaluatingPaths);
    let decision = PathDecision {
        all_paths_complete: true,
        next_path_number: 2,
        junction_instructions: IndexMap::new(),
        total_paths_needed: 1,
        reason: "no junctions".into(),
    };
    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::EvaluatePaths,
            output: WorkerOutput::Paths { decision, tracker: None },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Completed);
    assert!(matches!(
        effects[0],
        fl_core::Effect::SyncStatus { phase: Phase::Completed, .. }
    ));
}

#[test]
fn more_paths_seed_overrides_and_renavigate() {
    let mut record = record_in(Phase::EvaluatingPaths);
    executed_junction_path(&mut record);

    let mut instructions = IndexMap::new();
    instructions.insert("#country".to_string(), "DE".to_string());
    let decision = PathDecision {
        all_paths_complete: false,
        next_path_number: 2,
        junction_instructions: instructions,
        total_paths_needed: 2,
        reason: "testing DE".into(),
    };
    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::EvaluatePaths,
            output: WorkerOutput::Paths { decision, tracker: None },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Navigating);
    assert_eq!(record.step_index, 0);
    assert!(record.executed.is_empty());
    assert_eq!(record.override_for("#country"), Some("DE"));
    assert!(matches!(
        expect_dispatch(&effects),
        AgentDispatch::NavigateToForm { .. }
    ));
}

#[test]
fn unmatched_seed_fails_closed() {
    let mut record = record_in(Phase::EvaluatingPaths);
    record.stages = vec![fill_stage(1, "#name")];

    let mut instructions = IndexMap::new();
    instructions.insert("#vanished".to_string(), "X".to_string());
    let decision = PathDecision {
        all_paths_complete: false,
        next_path_number: 2,
        junction_instructions: instructions,
        total_paths_needed: 2,
        reason: "testing".into(),
    };
    advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::EvaluatePaths,
            output: WorkerOutput::Paths { decision, tracker: None },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        FailCode::JunctionOverrideLost
    );
}

#[test]
fn replay_applies_the_forced_option() {
    let mut record = record_in(Phase::Navigating);
    record.stages = vec![junction_stage(1, "#country", "country", &["FR", "DE"])];
    record
        .overrides
        .insert("#country".to_string(), "DE".to_string());

    // Navigation lands with steps already generated: replay directly.
    let effects = advance(
        &mut record,
        agent_result(
            AgentTaskKind::NavigateToForm,
            true,
            serde_json::json!({"success": true}),
        ),
        NOW,
    );
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => {
            assert_eq!(step.value.as_deref(), Some("DE"));
            assert_eq!(
                step.junction_info.as_ref().unwrap().chosen_option.as_deref(),
                Some("DE")
            );
        }
        other => panic!("expected forced exec, got {other:?}"),
    }
}

#[test]
fn verify_step_holds_until_visual_verdict() {
    let mut record = record_in(Phase::ExecutingStep);
    record.stages = vec![
        Stage::new(1, StepAction::Verify, "").description("confirmation banner visible"),
        fill_stage(2, "#next"),
    ];

    let effects = advance(
        &mut record,
        agent_result(AgentTaskKind::ExecStep, true, step_ok(false)),
        NOW,
    );
    assert_eq!(record.phase, Phase::VerifyingVisual);
    assert!(record.pending_step.is_some());
    assert_eq!(expect_enqueue(&effects), TaskName::VerifyDynamicStepVisual);

    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::VerifyDynamicStepVisual,
            output: WorkerOutput::StepVisual {
                passed: true,
                blocking_issue: None,
                detail: None,
            },
        },
        NOW,
    );
    assert!(record.pending_step.is_none());
    assert_eq!(record.executed.len(), 1);
    assert!(record
        .verified_fields
        .contains(&"confirmation banner visible".to_string()));
    match expect_dispatch(&effects) {
        AgentDispatch::ExecStep { step } => assert_eq!(step.selector, "#next"),
        other => panic!("expected next step, got {other:?}"),
    }
}

#[test]
fn visual_fail_is_terminal() {
    let mut record = record_in(Phase::VerifyingVisual);
    record.pending_step = Some(fl_core::ExecutedStep::plain(
        Stage::new(1, StepAction::Verify, "").description("banner"),
    ));

    advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::VerifyDynamicStepVisual,
            output: WorkerOutput::StepVisual {
                passed: false,
                blocking_issue: None,
                detail: Some("banner absent".into()),
            },
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
fn blocking_issue_retries_the_step_after_a_wait() {
    let mut record = record_in(Phase::VerifyingVisual);
    record.stages = vec![Stage::new(1, StepAction::Verify, "").description("banner")];
    record.pending_step = Some(fl_core::ExecutedStep::plain(record.stages[0].clone()));

    let effects = advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::VerifyDynamicStepVisual,
            output: WorkerOutput::StepVisual {
                passed: false,
                blocking_issue: Some("session expired overlay".into()),
                detail: None,
            },
        },
        NOW,
    );
    assert_eq!(record.phase, Phase::ExecutingStep);
    assert!(record.pending_step.is_none());
    match &effects[0] {
        fl_core::Effect::DispatchAgent { delay_ms, .. } => assert!(delay_ms.is_some()),
        other => panic!("expected delayed retry, got {other:?}"),
    }
}

#[test]
fn ui_issues_accumulate_without_duplicates_feeding_back() {
    let mut record = record_in(Phase::VerifyingVisual);
    record.stages = vec![
        Stage::new(1, StepAction::VerifyClickables, "body").description("sweep clickables"),
    ];
    record.pending_step = Some(fl_core::ExecutedStep::plain(record.stages[0].clone()));

    advance(
        &mut record,
        SessionEvent::WorkerDone {
            task: TaskName::VerifyUiVisual,
            output: WorkerOutput::UiVisual {
                new_issues: "overlapping labels on #address".into(),
            },
        },
        NOW,
    );
    assert_eq!(record.ui_issues.len(), 1);
    assert_eq!(record.executed.len(), 1);
}
