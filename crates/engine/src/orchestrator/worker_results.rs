// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background-task completion handling: AI output re-enters the
//! state machine.

use indexmap::IndexMap;

use fl_core::{
    ActivityKind, AgentDispatch, Effect, FailCause, FailCode, FieldVerdict, JunctionStep,
    PathDecision, Phase, RecoveryDecision, SessionRecord, Severity, Stage, TaskName, WorkerOutput,
};

use super::{
    check_overrides, continue_steps, discard, dispatch, dispatch_current_step, enqueue, fail,
    renumber, sync,
};
use crate::evaluator;
use crate::task_args::{EvaluateArgs, SaveArgs};

pub(super) fn handle(
    record: &mut SessionRecord,
    task: TaskName,
    output: WorkerOutput,
    now_ms: u64,
) -> Vec<Effect> {
    match output {
        WorkerOutput::Failed { cause } => task_failed(record, task, cause, now_ms),
        WorkerOutput::Steps { stages } => steps_arrived(record, stages, now_ms),
        WorkerOutput::Recovery { decision } => recovery_arrived(record, decision, now_ms),
        WorkerOutput::StepVisual { passed, blocking_issue, detail } => {
            step_visual_arrived(record, passed, blocking_issue, detail, now_ms)
        }
        WorkerOutput::UiVisual { new_issues } => ui_visual_arrived(record, new_issues, now_ms),
        WorkerOutput::PageVerdict { ready, failures } => {
            page_verdict_arrived(record, ready, failures, now_ms)
        }
        WorkerOutput::Saved { result_id, path_number } => {
            saved_arrived(record, result_id, path_number, now_ms)
        }
        WorkerOutput::Paths { decision, tracker } => {
            paths_arrived(record, decision, tracker, now_ms)
        }
    }
}

/// A worker's outermost frame converted a failure into structure; the
/// orchestrator is authoritative over retry vs give up.
fn task_failed(
    record: &mut SessionRecord,
    task: TaskName,
    cause: FailCause,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    match cause.code {
        // One regeneration for unparseable output or exhausted model
        // overload; the second soft failure is terminal.
        FailCode::AiParseError | FailCode::Internal if record.parse_failures == 0 => {
            record.parse_failures = 1;
            tracing::warn!(
                session_id = %record.id,
                task = %task,
                "model output unparseable, requesting one regeneration"
            );
            match record.phase {
                Phase::NeedSteps | Phase::Regenerating => {
                    vec![dispatch(record, AgentDispatch::ExtractDom, None)]
                }
                _ => fail(record, cause, now_ms),
            }
        }
        _ => fail(record, cause, now_ms),
    }
}

fn steps_arrived(record: &mut SessionRecord, mut stages: Vec<Stage>, now_ms: u64) -> Vec<Effect> {
    match record.phase {
        Phase::NeedSteps => {
            record.touch(now_ms);
            renumber(&mut stages);
            record.stages = stages;
            record.step_index = 0;
            record.parse_failures = 0;
            record.phase = Phase::HaveSteps;
            if let Some(effects) = check_overrides(record, now_ms) {
                return effects;
            }
            continue_steps(record)
        }
        Phase::Regenerating => {
            record.touch(now_ms);
            // Healed remainder: keep the executed prefix, splice the
            // regenerated tail behind it.
            let mut all: Vec<Stage> =
                record.executed.iter().map(|e| e.stage.clone()).collect();
            let executed_len = all.len();
            all.extend(stages);
            renumber(&mut all);
            record.stages = all;
            record.step_index = executed_len;
            record.parse_failures = 0;
            record.stages_updated = true;
            record.phase = Phase::HaveSteps;
            if let Some(effects) = check_overrides(record, now_ms) {
                return effects;
            }
            continue_steps(record)
        }
        _ => discard(record, "task:steps"),
    }
}

fn recovery_arrived(
    record: &mut SessionRecord,
    decision: RecoveryDecision,
    now_ms: u64,
) -> Vec<Effect> {
    if record.phase != Phase::Recovering {
        return discard(record, "task:recovery");
    }
    record.touch(now_ms);
    record.last_ai_decision = Some(decision.to_string());

    match decision {
        RecoveryDecision::LocatorChanged { new_selector, new_xpath } => {
            record.retry_count += 1;
            if record.retry_count > record.config.max_step_retries {
                return fail(
                    record,
                    FailCause::new(
                        FailCode::RecoveryExhausted,
                        "locator fixes exhausted the retry budget",
                    ),
                    now_ms,
                );
            }
            let step_index = record.step_index;
            if let Some(stage) = record.stages.get_mut(step_index) {
                stage.selector = new_selector;
                stage.full_xpath = new_xpath;
            }
            record.stages_updated = true;
            if let Some(effects) = check_overrides(record, now_ms) {
                return effects;
            }
            match dispatch_current_step(record, None) {
                Some(effect) => vec![effect],
                None => Vec::new(),
            }
        }

        RecoveryDecision::PageGeneralError => {
            record.retry_count += 1;
            if record.retry_count > record.config.max_page_retries {
                return fail(
                    record,
                    FailCause::new(
                        FailCode::PageUnavailable,
                        "page still unavailable after bounded retries",
                    ),
                    now_ms,
                );
            }
            let wait = record.config.page_retry_wait_ms;
            match dispatch_current_step(record, Some(wait)) {
                Some(effect) => vec![effect],
                None => Vec::new(),
            }
        }

        RecoveryDecision::NeedHealing => {
            record.phase = Phase::Regenerating;
            vec![dispatch(record, AgentDispatch::ExtractDom, None)]
        }

        RecoveryDecision::CorrectionSteps { pre_steps, replacement } => {
            record.retry_count += 1;
            if record.retry_count > record.config.max_step_retries {
                return fail(
                    record,
                    FailCause::new(
                        FailCode::RecoveryExhausted,
                        "correction steps exhausted the retry budget",
                    ),
                    now_ms,
                );
            }
            let step_index = record.step_index;
            if let Some(step) = replacement {
                if let Some(stage) = record.stages.get_mut(step_index) {
                    *stage = step;
                }
            }
            let splice_at = step_index.min(record.stages.len());
            for (offset, step) in pre_steps.into_iter().enumerate() {
                record.stages.insert(splice_at + offset, step);
            }
            renumber(&mut record.stages);
            record.stages_updated = true;
            if let Some(effects) = check_overrides(record, now_ms) {
                return effects;
            }
            match dispatch_current_step(record, None) {
                Some(effect) => vec![effect],
                None => Vec::new(),
            }
        }
    }
}

fn commit_pending(record: &mut SessionRecord) -> Vec<Effect> {
    let Some(executed) = record.pending_step.take() else {
        return discard(record, "task:visual-verdict");
    };
    if executed.stage.action == fl_core::StepAction::Verify
        && !executed.stage.description.is_empty()
    {
        record.verified_fields.push(executed.stage.description.clone());
    }
    let path_config = record.config.path.clone();
    evaluator::update_junction_from_step(&mut record.tracker, &executed, &path_config);
    record.record_executed(executed);
    continue_steps(record)
}

fn step_visual_arrived(
    record: &mut SessionRecord,
    passed: bool,
    blocking_issue: Option<String>,
    detail: Option<String>,
    now_ms: u64,
) -> Vec<Effect> {
    if record.phase != Phase::VerifyingVisual {
        return discard(record, "task:step-visual");
    }
    record.touch(now_ms);

    // A blocking page issue (loading spinner, 404, expired session) is
    // a page-general condition, not a verification verdict.
    if let Some(issue) = blocking_issue {
        record.pending_step = None;
        record.retry_count += 1;
        if record.retry_count > record.config.max_page_retries {
            return fail(
                record,
                FailCause::new(FailCode::PageUnavailable, issue),
                now_ms,
            );
        }
        let wait = record.config.page_retry_wait_ms;
        return match dispatch_current_step(record, Some(wait)) {
            Some(effect) => vec![effect],
            None => Vec::new(),
        };
    }

    if !passed {
        return fail(
            record,
            FailCause::new(
                FailCode::VerificationFailed,
                detail.unwrap_or_else(|| "verify step failed".into()),
            ),
            now_ms,
        );
    }

    commit_pending(record)
}

fn ui_visual_arrived(
    record: &mut SessionRecord,
    new_issues: String,
    now_ms: u64,
) -> Vec<Effect> {
    if record.phase != Phase::VerifyingVisual {
        return discard(record, "task:ui-visual");
    }
    record.touch(now_ms);
    if !new_issues.trim().is_empty() {
        record.ui_issues.push(new_issues);
    }
    commit_pending(record)
}

fn page_verdict_arrived(
    record: &mut SessionRecord,
    ready: bool,
    failures: Vec<FieldVerdict>,
    now_ms: u64,
) -> Vec<Effect> {
    if record.phase != Phase::VerifyingPage {
        return discard(record, "task:page-verdict");
    }
    record.touch(now_ms);

    if !ready {
        record.retry_count += 1;
        if record.retry_count > record.config.max_page_retries {
            return fail(
                record,
                FailCause::new(
                    FailCode::PageUnavailable,
                    "result page never became ready",
                ),
                now_ms,
            );
        }
        let wait = record.config.page_retry_wait_ms;
        return vec![dispatch(record, AgentDispatch::ExtractDom, Some(wait))];
    }

    let hard_failures: Vec<&FieldVerdict> = failures
        .iter()
        .filter(|f| !f.passed && f.severity == Severity::High)
        .collect();
    if !hard_failures.is_empty() {
        let detail = hard_failures
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.field,
                    f.detail.as_deref().unwrap_or("not reflected on result page")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        return fail(
            record,
            FailCause::new(FailCode::VerificationFailed, detail),
            now_ms,
        );
    }

    for verdict in failures.iter().filter(|f| f.passed) {
        if !record.verified_fields.contains(&verdict.field) {
            record.verified_fields.push(verdict.field.clone());
        }
    }

    let args = SaveArgs {
        form_route_id: record.form_route_id,
        path_number: record.tracker.current_path,
        steps: record.executed.clone(),
        verified_fields: record.verified_fields.clone(),
        healed_login_stages: record
            .stages_updated
            .then(|| record.healed_login_stages.clone())
            .flatten(),
        healed_nav_stages: record
            .stages_updated
            .then(|| record.healed_nav_stages.clone())
            .flatten(),
    };
    vec![enqueue(record, TaskName::SaveMappingResult, &args, now_ms)]
}

fn saved_arrived(
    record: &mut SessionRecord,
    result_id: fl_core::ResultId,
    path_number: u32,
    now_ms: u64,
) -> Vec<Effect> {
    record.touch(now_ms);
    // Fold this path's junction choices into the tracker.
    let mut choices = IndexMap::new();
    let mut junction_steps = Vec::new();
    for executed in &record.executed {
        if !executed.is_junction() {
            continue;
        }
        let Some(info) = &executed.stage.junction_info else { continue };
        let Some(chosen) = info
            .chosen_option
            .clone()
            .or_else(|| executed.stage.value.clone())
        else {
            continue;
        };
        let junction_id = fl_core::JunctionId::from_name(&info.junction_name);
        choices.insert(junction_id.clone(), chosen.clone());
        junction_steps.push(JunctionStep {
            step_index: executed.stage.step_number,
            junction_id,
            junction_name: info.junction_name.clone(),
            option: chosen,
            selector: executed.stage.selector.clone(),
        });
    }
    let committed = record
        .tracker
        .complete_path(choices, junction_steps, Some(result_id));
    tracing::info!(
        session_id = %record.id,
        path_number,
        committed,
        "path committed"
    );

    if record.activity == ActivityKind::LogoutMapping {
        record.phase = Phase::Completed;
        return vec![sync(record)];
    }

    record.phase = Phase::EvaluatingPaths;
    let args = EvaluateArgs {
        tracker: record.tracker.clone(),
        config: record.config.path.clone(),
    };
    vec![enqueue(record, TaskName::EvaluatePaths, &args, now_ms)]
}

fn paths_arrived(
    record: &mut SessionRecord,
    decision: PathDecision,
    tracker: Option<fl_core::PathTracker>,
    now_ms: u64,
) -> Vec<Effect> {
    if record.phase != Phase::EvaluatingPaths {
        return discard(record, "task:paths");
    }
    record.touch(now_ms);
    if let Some(tracker) = tracker {
        record.tracker = tracker;
    }

    if decision.all_paths_complete {
        tracing::info!(
            session_id = %record.id,
            paths = record.tracker.completed.len(),
            reason = %decision.reason,
            "mapping complete"
        );
        record.phase = Phase::Completed;
        return vec![sync(record)];
    }

    if !record.seed_next_path(decision.junction_instructions) {
        return fail(
            record,
            FailCause::new(
                FailCode::JunctionOverrideLost,
                "next-path override matches no known step",
            ),
            now_ms,
        );
    }
    vec![dispatch(record, super::navigate_dispatch(record), None)]
}
