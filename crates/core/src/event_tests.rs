// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::stage::StepAction;

#[test]
fn agent_result_serializes_with_type_tag() {
    let event = SessionEvent::AgentResult {
        task_id: TaskId::from_string("task-1"),
        kind: AgentTaskKind::ExecStep,
        success: true,
        result: Some(serde_json::json!({"dom_html": "<form/>"})),
        error: None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent:result");
    assert_eq!(json["kind"], "exec_step");
    assert!(json.get("error").is_none());
}

#[test]
fn worker_done_round_trips() {
    let event = SessionEvent::WorkerDone {
        task: TaskName::AnalyzeFailureAndRecover,
        output: WorkerOutput::Recovery {
            decision: RecoveryDecision::LocatorChanged {
                new_selector: "#save-btn".into(),
                new_xpath: None,
            },
        },
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: SessionEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn recovery_decision_tags_are_snake_case() {
    let json = serde_json::to_value(&RecoveryDecision::PageGeneralError).unwrap();
    assert_eq!(json["kind"], "page_general_error");

    let correction = RecoveryDecision::CorrectionSteps {
        pre_steps: vec![Stage::new(1, StepAction::Click, "#expand")],
        replacement: None,
    };
    let json = serde_json::to_value(&correction).unwrap();
    assert_eq!(json["kind"], "correction_steps");
    assert_eq!(json["pre_steps"][0]["selector"], "#expand");
}

#[test]
fn event_names_are_stable() {
    assert_eq!(SessionEvent::Cancel.name(), "cancel");
    assert_eq!(SessionEvent::Timeout.name(), "timeout");
}

#[test]
fn page_verdict_carries_field_failures() {
    let output = WorkerOutput::PageVerdict {
        ready: true,
        failures: vec![FieldVerdict {
            field: "email".into(),
            passed: false,
            severity: Severity::High,
            detail: Some("value not shown on result page".into()),
        }],
    };
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["kind"], "page_verdict");
    assert_eq!(json["failures"][0]["severity"], "high");
}
