// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-result handling: one browser operation came back.

use fl_core::{
    ActivityKind, AgentTaskKind, DomSnapshot, Effect, ExecStepOutcome, ExecutedStep, FailCause,
    FailCode, LoginOutcome, LogoutOutcome, NavigateOutcome, Phase, SessionRecord, StepAction,
    TaskName,
};

use super::{continue_steps, discard, dispatch, enqueue, fail, navigate_dispatch};
use crate::evaluator;
use crate::task_args::{AnalyzeArgs, PageVisualArgs, RecoverArgs, RegenerateArgs, SaveArgs,
    StepVisualArgs, UiVisualArgs};

pub(super) fn handle(
    record: &mut SessionRecord,
    kind: AgentTaskKind,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    match (record.phase, kind) {
        (Phase::LoginRequested, AgentTaskKind::Login) => {
            login_result(record, success, result, error, now_ms)
        }
        (Phase::Navigating, AgentTaskKind::NavigateToForm) => {
            navigate_result(record, success, result, error, now_ms)
        }
        (Phase::Navigating, AgentTaskKind::Logout) => {
            logout_result(record, success, result, error, now_ms)
        }
        (Phase::NeedSteps | Phase::Regenerating | Phase::VerifyingPage, AgentTaskKind::ExtractDom) => {
            dom_result(record, success, result, error, now_ms)
        }
        (Phase::ExecutingStep, AgentTaskKind::ExecStep) => {
            step_result(record, success, result, error, now_ms)
        }
        _ => discard(record, &format!("agent:{kind}")),
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    result: Option<serde_json::Value>,
) -> Result<T, FailCause> {
    let value = result.ok_or_else(|| {
        FailCause::new(FailCode::AgentError, "agent result carried no payload")
    })?;
    serde_json::from_value(value).map_err(|e| {
        FailCause::new(FailCode::AgentError, format!("malformed agent result: {e}"))
    })
}

fn login_result(
    record: &mut SessionRecord,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    if !success {
        let detail = error.unwrap_or_else(|| "login failed".into());
        return fail(
            record,
            FailCause::new(FailCode::AgentError, format!("login failed: {detail}")),
            now_ms,
        );
    }
    let outcome: LoginOutcome = match parse(result) {
        Ok(o) => o,
        Err(cause) => return fail(record, cause, now_ms),
    };
    if !outcome.success {
        return fail(
            record,
            FailCause::new(FailCode::AgentError, "agent reported login failure"),
            now_ms,
        );
    }

    record.dashboard_url = outcome.dashboard_url;
    if let Some(final_stages) = outcome.final_stages {
        if record.route.login_stages.as_ref() != Some(&final_stages) {
            record.healed_login_stages = Some(final_stages);
            record.stages_updated = true;
        }
    }

    record.phase = Phase::Navigating;
    match record.activity {
        ActivityKind::LogoutMapping => {
            let stages = record.route.navigation_stages.clone();
            vec![dispatch(record, fl_core::AgentDispatch::Logout { stages }, None)]
        }
        _ => vec![dispatch(record, navigate_dispatch(record), None)],
    }
}

fn navigate_result(
    record: &mut SessionRecord,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    if !success {
        let detail = error.unwrap_or_else(|| "navigation failed".into());
        return fail(
            record,
            FailCause::new(FailCode::AgentError, format!("navigation failed: {detail}")),
            now_ms,
        );
    }
    let outcome: NavigateOutcome = match parse(result) {
        Ok(o) => o,
        Err(cause) => return fail(record, cause, now_ms),
    };
    if !outcome.success {
        return fail(
            record,
            FailCause::new(FailCode::AgentError, "agent reported navigation failure"),
            now_ms,
        );
    }

    if let Some(final_stages) = outcome.final_stages {
        if final_stages != record.route.navigation_stages {
            record.healed_nav_stages = Some(final_stages);
            record.stages_updated = true;
        }
    }

    // With steps already generated (next junction path), replay them;
    // otherwise pull the DOM for step generation.
    if record.stages.is_empty() {
        record.phase = Phase::NeedSteps;
        vec![dispatch(record, fl_core::AgentDispatch::ExtractDom, None)]
    } else {
        record.phase = Phase::HaveSteps;
        continue_steps(record)
    }
}

fn logout_result(
    record: &mut SessionRecord,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    if !success {
        let detail = error.unwrap_or_else(|| "logout failed".into());
        return fail(
            record,
            FailCause::new(FailCode::AgentError, format!("logout failed: {detail}")),
            now_ms,
        );
    }
    let outcome: LogoutOutcome = match parse(result) {
        Ok(o) => o,
        Err(cause) => return fail(record, cause, now_ms),
    };
    if !outcome.success {
        return fail(
            record,
            FailCause::new(FailCode::AgentError, "agent reported logout failure"),
            now_ms,
        );
    }

    record.executed = outcome
        .final_stages
        .unwrap_or_else(|| record.route.navigation_stages.clone())
        .into_iter()
        .map(ExecutedStep::plain)
        .collect();
    let args = SaveArgs {
        form_route_id: record.form_route_id,
        path_number: record.tracker.current_path,
        steps: record.executed.clone(),
        verified_fields: Vec::new(),
        healed_login_stages: record.healed_login_stages.clone(),
        healed_nav_stages: None,
    };
    vec![enqueue(record, TaskName::SaveMappingResult, &args, now_ms)]
}

fn dom_result(
    record: &mut SessionRecord,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    if !success {
        let detail = error.unwrap_or_else(|| "dom extraction failed".into());
        return fail(
            record,
            FailCause::new(FailCode::AgentError, format!("dom extraction failed: {detail}")),
            now_ms,
        );
    }
    let snapshot: DomSnapshot = match parse(result) {
        Ok(s) => s,
        Err(cause) => return fail(record, cause, now_ms),
    };

    match record.phase {
        Phase::NeedSteps => {
            let args = AnalyzeArgs {
                dom_html: snapshot.dom_html,
                screenshot_key: snapshot.screenshot_key,
                test_case: record.test_case.clone(),
                user_inputs: record.route.user_inputs.clone(),
                spec_document: record.route.spec_document.clone(),
                junction_instructions: record.overrides.clone(),
            };
            vec![enqueue(record, TaskName::AnalyzeFormPage, &args, now_ms)]
        }
        Phase::Regenerating => {
            let args = RegenerateArgs {
                dom_html: snapshot.dom_html,
                screenshot_key: snapshot.screenshot_key,
                executed: record.executed.clone(),
            };
            vec![enqueue(record, TaskName::RegenerateSteps, &args, now_ms)]
        }
        Phase::VerifyingPage => {
            let args = PageVisualArgs {
                screenshot_key: snapshot.screenshot_key,
                executed: record.executed.clone(),
            };
            vec![enqueue(record, TaskName::VerifyPageVisual, &args, now_ms)]
        }
        _ => discard(record, "agent:extract_dom"),
    }
}

fn step_result(
    record: &mut SessionRecord,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    let Some(stage) = record.current_stage().cloned() else {
        return fail(
            record,
            FailCause::new(FailCode::Internal, "step result with no current stage"),
            now_ms,
        );
    };
    // A failed exec may arrive with only an error string, no payload.
    let outcome: ExecStepOutcome = match result {
        Some(value) => match serde_json::from_value(value) {
            Ok(outcome) => outcome,
            Err(e) => {
                return fail(
                    record,
                    FailCause::new(
                        FailCode::AgentError,
                        format!("malformed step result: {e}"),
                    ),
                    now_ms,
                )
            }
        },
        None => ExecStepOutcome {
            success,
            error: error.clone(),
            dom_html: None,
            screenshot_key: None,
            fields_changed_hint: None,
        },
    };

    if success && outcome.success {
        return step_succeeded(record, stage, outcome, now_ms);
    }
    step_failed(record, stage, outcome, error, now_ms)
}

fn executed_from(record: &SessionRecord, stage: &fl_core::Stage, fields_changed: bool) -> ExecutedStep {
    let mut stage = stage.clone();
    if stage.is_junction {
        let chosen = record
            .override_for(&stage.selector)
            .map(str::to_string)
            .or_else(|| stage.value.clone());
        if let Some(chosen) = &chosen {
            stage.value = Some(chosen.clone());
        }
        if let Some(info) = stage.junction_info.as_mut() {
            info.chosen_option = chosen;
        }
    }
    ExecutedStep { stage, fields_changed }
}

fn step_succeeded(
    record: &mut SessionRecord,
    stage: fl_core::Stage,
    outcome: ExecStepOutcome,
    now_ms: u64,
) -> Vec<Effect> {
    let executed = executed_from(record, &stage, outcome.fields_changed_hint.unwrap_or(false));

    match stage.action {
        // Verify steps hold until the visual verdict lands.
        StepAction::Verify => {
            record.pending_step = Some(executed);
            record.phase = Phase::VerifyingVisual;
            let args = StepVisualArgs {
                screenshot_key: outcome.screenshot_key,
                description: stage.description.clone(),
            };
            vec![enqueue(record, TaskName::VerifyDynamicStepVisual, &args, now_ms)]
        }
        StepAction::VerifyClickables => {
            record.pending_step = Some(executed);
            record.phase = Phase::VerifyingVisual;
            let args = UiVisualArgs {
                screenshot_key: outcome.screenshot_key,
                prior_issues: record.ui_issues.clone(),
            };
            vec![enqueue(record, TaskName::VerifyUiVisual, &args, now_ms)]
        }
        _ => {
            let path_config = record.config.path.clone();
            evaluator::update_junction_from_step(&mut record.tracker, &executed, &path_config);
            record.record_executed(executed);
            continue_steps(record)
        }
    }
}

fn step_failed(
    record: &mut SessionRecord,
    stage: fl_core::Stage,
    outcome: ExecStepOutcome,
    error: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    let detail = outcome
        .error
        .or(error)
        .unwrap_or_else(|| "step failed".into());

    // No alert present is not a failure; advance silently.
    if stage.action.is_alert() {
        let executed = executed_from(record, &stage, false);
        record.record_executed(executed);
        return continue_steps(record);
    }

    // A failed verify is a test-assertion failure, not recoverable.
    if stage.action.is_assertion() {
        return fail(
            record,
            FailCause::new(FailCode::VerificationFailed, detail),
            now_ms,
        );
    }

    record.recovery_count += 1;
    if record.recovery_count > record.config.max_recoveries {
        return fail(
            record,
            FailCause::new(
                FailCode::RecoveryExhausted,
                format!("recovery budget exhausted at step {}: {detail}", stage.step_number),
            ),
            now_ms,
        );
    }

    record.last_error = Some(detail.clone());
    record.phase = Phase::Recovering;
    let args = RecoverArgs {
        step: stage,
        error: detail,
        dom_html: outcome.dom_html,
        screenshot_key: outcome.screenshot_key,
        recovery_history: record.last_ai_decision.clone(),
    };
    vec![enqueue(record, TaskName::AnalyzeFailureAndRecover, &args, now_ms)]
}
