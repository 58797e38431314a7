// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session state machine.
//!
//! `advance` is a pure transition: it mutates the record and returns
//! the effects to execute. It never touches a store or a network; the
//! intake layer owns persistence and effect execution. Transitions are
//! driven only by agent results, background-task completions, and
//! explicit cancellation, never by wall-clock polling.

mod agent_results;
mod worker_results;

use fl_core::{
    AgentDispatch, Effect, FailCause, FailCode, Phase, SessionEvent, SessionRecord, TaskName,
    WorkerEnvelope,
};

/// Advance a session by one input. Returns the effects to execute
/// after the record is persisted.
pub fn advance(record: &mut SessionRecord, event: SessionEvent, now_ms: u64) -> Vec<Effect> {
    if record.is_terminal() {
        tracing::warn!(
            session_id = %record.id,
            phase = %record.phase,
            event = event.name(),
            "input for terminal session discarded"
        );
        return Vec::new();
    }

    match event {
        SessionEvent::Cancel => {
            record.cancel(now_ms);
            vec![sync(record)]
        }
        SessionEvent::Timeout => fail(record, FailCause::timeout(), now_ms),
        SessionEvent::AgentResult { kind, success, result, error, .. } => {
            agent_results::handle(record, kind, success, result, error, now_ms)
        }
        SessionEvent::WorkerDone { task, output } => {
            worker_results::handle(record, task, output, now_ms)
        }
    }
}

/// First dispatch for a freshly created session.
pub fn kickoff(record: &mut SessionRecord, now_ms: u64) -> Vec<Effect> {
    record.phase = Phase::LoginRequested;
    record.touch(now_ms);
    vec![dispatch(record, AgentDispatch::Login, None)]
}

// --- shared helpers ---

pub(crate) fn sync(record: &SessionRecord) -> Effect {
    Effect::SyncStatus {
        session_id: record.id,
        phase: record.phase,
        cause: record.fail_cause.clone(),
    }
}

pub(crate) fn fail(record: &mut SessionRecord, cause: FailCause, now_ms: u64) -> Vec<Effect> {
    tracing::warn!(session_id = %record.id, cause = %cause, "session failed");
    record.fail(cause, now_ms);
    vec![sync(record)]
}

pub(crate) fn dispatch(
    record: &SessionRecord,
    dispatch: AgentDispatch,
    delay_ms: Option<u64>,
) -> Effect {
    Effect::DispatchAgent { user_id: record.user_id, dispatch, delay_ms }
}

pub(crate) fn enqueue<T: serde::Serialize>(
    record: &SessionRecord,
    task: TaskName,
    args: &T,
    now_ms: u64,
) -> Effect {
    Effect::EnqueueWorker {
        envelope: WorkerEnvelope {
            task,
            session_id: record.id,
            args: serde_json::to_value(args).unwrap_or(serde_json::Value::Null),
            dispatched_at_ms: now_ms,
            session_version: record.version,
        },
    }
}

/// Navigate dispatch: from the dashboard when login captured one, with
/// healed navigation stages when a recovery produced them.
pub(crate) fn navigate_dispatch(record: &SessionRecord) -> AgentDispatch {
    AgentDispatch::NavigateToForm {
        start_url: record
            .dashboard_url
            .clone()
            .unwrap_or_else(|| record.base_url.clone()),
        stages: record
            .healed_nav_stages
            .clone()
            .unwrap_or_else(|| record.route.navigation_stages.clone()),
    }
}

/// Dispatch the stage at the current index, applying any junction
/// override to its value. Transitions to `ExecutingStep`.
pub(crate) fn dispatch_current_step(
    record: &mut SessionRecord,
    delay_ms: Option<u64>,
) -> Option<Effect> {
    let mut stage = record.current_stage()?.clone();
    if let Some(forced) = record.override_for(&stage.selector) {
        let forced = forced.to_string();
        stage.value = Some(forced.clone());
        if let Some(info) = stage.junction_info.as_mut() {
            info.chosen_option = Some(forced);
        }
    }
    record.phase = Phase::ExecutingStep;
    Some(dispatch(record, AgentDispatch::ExecStep { step: stage }, delay_ms))
}

/// Steps exhausted: capture the result page for verification.
pub(crate) fn all_steps_done(record: &mut SessionRecord) -> Vec<Effect> {
    record.phase = Phase::VerifyingPage;
    record.retry_count = 0;
    vec![dispatch(record, AgentDispatch::ExtractDom, None)]
}

/// Continue after a step landed: next step, or page verification.
pub(crate) fn continue_steps(record: &mut SessionRecord) -> Vec<Effect> {
    if record.steps_remaining() {
        match dispatch_current_step(record, None) {
            Some(effect) => vec![effect],
            None => Vec::new(),
        }
    } else {
        all_steps_done(record)
    }
}

/// Renumber stages sequentially from 1.
pub(crate) fn renumber(stages: &mut [fl_core::Stage]) {
    for (idx, stage) in stages.iter_mut().enumerate() {
        stage.step_number = idx as u32 + 1;
    }
}

/// Fail closed when a pending junction override no longer matches any
/// stage after the step list changed underneath it.
pub(crate) fn check_overrides(record: &mut SessionRecord, now_ms: u64) -> Option<Vec<Effect>> {
    if !record.overrides.is_empty() && !record.overrides_still_match() {
        return Some(fail(
            record,
            FailCause::new(
                FailCode::JunctionOverrideLost,
                "junction override no longer matches a step after recovery",
            ),
            now_ms,
        ));
    }
    None
}

/// Unexpected (phase, input) pairing: log and discard.
pub(crate) fn discard(record: &SessionRecord, what: &str) -> Vec<Effect> {
    tracing::warn!(
        session_id = %record.id,
        phase = %record.phase,
        input = what,
        "unexpected input for phase, discarded"
    );
    Vec::new()
}

#[cfg(test)]
#[path = "orchestrator_tests/mod.rs"]
mod tests;
