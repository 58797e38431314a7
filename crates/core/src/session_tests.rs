// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::FailCode;
use crate::stage::StepAction;
use crate::FakeClock;
use indexmap::IndexMap;

fn stages(selectors: &[&str]) -> Vec<Stage> {
    selectors
        .iter()
        .enumerate()
        .map(|(i, s)| Stage::new(i as u32 + 1, StepAction::Fill, *s))
        .collect()
}

fn new_session() -> SessionRecord {
    let clock = FakeClock::new();
    SessionRecord::new(
        NewSession {
            activity: ActivityKind::FormMapping,
            tenant_id: TenantId(1),
            user_id: UserId(2),
            project_id: ProjectId(3),
            network_id: NetworkId(4),
            form_route_id: Some(FormRouteId(5)),
            test_page_id: None,
            route: RouteSnapshot::default(),
            base_url: "https://app.example.com".into(),
            test_case: None,
            config: SessionConfig::default(),
        },
        &clock,
    )
}

#[test]
fn new_session_starts_at_version_zero() {
    let session = new_session();
    assert_eq!(session.phase, Phase::Created);
    assert_eq!(session.version, 0);
    assert!(!session.is_terminal());
}

#[test]
fn touch_is_strictly_monotone() {
    let mut session = new_session();
    session.touch(1_000);
    session.touch(2_000);
    session.touch(2_000);
    assert_eq!(session.version, 3);
    assert_eq!(session.updated_at_ms, 2_000);
}

#[test]
fn fail_records_structured_cause() {
    let mut session = new_session();
    session.fail(FailCause::budget_exceeded(0), 1_000);
    assert_eq!(session.phase, Phase::Failed);
    assert!(session.is_terminal());
    assert_eq!(session.fail_cause.as_ref().unwrap().code, FailCode::BudgetExceeded);
    assert_eq!(session.version, 1);
}

#[test]
fn cancel_bumps_version() {
    let mut session = new_session();
    let before = session.version;
    session.cancel(1_000);
    assert_eq!(session.phase, Phase::Cancelled);
    assert_eq!(session.version, before + 1);
    assert!(session.fail_cause.is_none());
}

#[test]
fn record_executed_advances_and_clears_retries() {
    let mut session = new_session();
    session.stages = stages(&["#a", "#b"]);
    session.retry_count = 1;
    session.record_executed(ExecutedStep::plain(session.stages[0].clone()));
    assert_eq!(session.step_index, 1);
    assert_eq!(session.retry_count, 0);
    assert!(session.steps_remaining());
    assert_eq!(session.current_stage().unwrap().selector, "#b");
}

#[test]
fn seed_next_path_resets_for_fresh_entry() {
    let mut session = new_session();
    session.stages = stages(&["#name", "#type", "#country"]);
    session.step_index = 3;
    session.retry_count = 1;
    session.executed = session
        .stages
        .iter()
        .cloned()
        .map(ExecutedStep::plain)
        .collect();

    let mut instructions = IndexMap::new();
    instructions.insert("#country".to_string(), "FR".to_string());
    instructions.insert("#type".to_string(), "business".to_string());

    assert!(session.seed_next_path(instructions));
    assert_eq!(session.phase, Phase::Navigating);
    assert_eq!(session.step_index, 0);
    assert!(session.executed.is_empty());
    assert_eq!(session.retry_count, 0);
    assert_eq!(session.override_for("#country"), Some("FR"));
}

#[test]
fn seed_next_path_fails_closed_without_matching_stage() {
    let mut session = new_session();
    session.stages = stages(&["#name"]);
    let mut instructions = IndexMap::new();
    instructions.insert("#vanished".to_string(), "X".to_string());
    assert!(!session.seed_next_path(instructions));

    assert!(!session.seed_next_path(IndexMap::new()));
}

#[test]
fn overrides_match_against_remaining_or_executed_stages() {
    let mut session = new_session();
    session.stages = stages(&["#type", "#country"]);
    let mut instructions = IndexMap::new();
    instructions.insert("#country".to_string(), "FR".to_string());
    assert!(session.seed_next_path(instructions));
    assert!(session.overrides_still_match());

    // A recovery that rewrote the remaining steps loses the override.
    session.stages = stages(&["#totally-different"]);
    session.step_index = 0;
    session.executed.clear();
    assert!(!session.overrides_still_match());
}

#[test]
fn record_survives_json_round_trip() {
    let mut session = new_session();
    session.stages = stages(&["#a"]);
    session.touch(9_000);
    let json = serde_json::to_string(&session).unwrap();
    let back: SessionRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, session);
}
