// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    accept = { StepAction::AcceptAlert },
    dismiss = { StepAction::DismissAlert },
)]
fn alert_actions_fail_soft(action: StepAction) {
    assert!(action.is_alert());
    assert!(!action.is_assertion());
}

#[test]
fn verify_is_an_assertion() {
    assert!(StepAction::Verify.is_assertion());
    assert!(!StepAction::Fill.is_assertion());
}

#[test]
fn action_serde_uses_snake_case() {
    let json = serde_json::to_string(&StepAction::WaitDomReady).unwrap();
    assert_eq!(json, "\"wait_dom_ready\"");
    let parsed: StepAction = serde_json::from_str("\"accept_alert\"").unwrap();
    assert_eq!(parsed, StepAction::AcceptAlert);
}

#[test]
fn stage_omits_empty_optionals() {
    let stage = Stage::new(1, StepAction::Click, "#save").description("save the record");
    let json = serde_json::to_value(&stage).unwrap();
    assert!(json.get("value").is_none());
    assert!(json.get("full_xpath").is_none());
    assert_eq!(json["selector"], "#save");
}

#[test]
fn executed_step_flattens_stage() {
    let mut info = JunctionInfo::new("country", vec!["FR".into(), "DE".into()]);
    info.chosen_option = Some("FR".into());
    let step = ExecutedStep {
        stage: Stage::new(3, StepAction::Select, "#country")
            .value("FR")
            .junction(info),
        fields_changed: true,
    };
    let json = serde_json::to_value(&step).unwrap();
    assert_eq!(json["step_number"], 3);
    assert_eq!(json["is_junction"], true);
    assert_eq!(json["junction_info"]["chosen_option"], "FR");

    let back: ExecutedStep = serde_json::from_value(json).unwrap();
    assert_eq!(back, step);
    assert!(back.is_junction());
}

#[test]
fn plain_executed_step_round_trips_without_junction_fields() {
    let step = ExecutedStep::plain(Stage::new(1, StepAction::Fill, "#name").value("jo"));
    let json = serde_json::to_value(&step).unwrap();
    assert!(json.get("is_junction").is_none());
    let back: ExecutedStep = serde_json::from_value(json).unwrap();
    assert!(!back.is_junction());
}
