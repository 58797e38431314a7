// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation, budget, recovery, and isolation specs.

use crate::prelude::*;

use fl_core::{
    AgentQueueMessage, AgentTaskKind, AgentTaskParams, Clock, FailCode, Phase, SessionEvent,
    TaskId, TenantId, UserId, WorkerOutput,
};
use fl_store::FastStore;

/// Walk a session to the point where analyze_form_page sits on the
/// mapper queue.
async fn advance_to_analyze(world: &World) -> fl_core::SessionId {
    let session_id = world.start_session().await;
    let agent = happy_agent(|_, _| false);
    // login, navigate, extract_dom
    for _ in 0..3 {
        assert!(world.agent_turn(&*agent).await);
    }
    session_id
}

/// Cancel while analyze is in flight, then deliver the
/// late result. The session stays cancelled, nothing new is queued.
#[tokio::test]
async fn stale_result_after_cancel_changes_nothing() {
    let world = World::new().await;
    let session_id = advance_to_analyze(&world).await;

    let snapshot = world.session(&session_id).await.version;
    world.intake.cancel(&session_id).await.unwrap();
    let cancelled = world.session(&session_id).await;
    assert_eq!(cancelled.phase, Phase::Cancelled);

    // The in-flight task completes late and reports through intake.
    world
        .intake
        .submit(
            &session_id,
            SessionEvent::WorkerDone {
                task: fl_core::TaskName::AnalyzeFormPage,
                output: WorkerOutput::Steps {
                    stages: vec![fl_core::Stage::new(1, fl_core::StepAction::Fill, "#name")],
                },
            },
            Some(snapshot),
        )
        .await
        .unwrap();

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Cancelled);
    assert_eq!(record.version, cancelled.version, "late result produced no state change");
    assert!(record.stages.is_empty());
    assert_eq!(world.fast.worker_queue_len(fl_core::WorkerQueue::Mapper), 1,
        "only the original analyze envelope remains");
    let status = world.intake.repos().sessions.status(&session_id).await.unwrap();
    assert_eq!(status.as_deref(), Some("cancelled"));
}

/// $1.00 daily budget, $0.95 already recorded, $0.10 forecast.
/// The third call is rejected, the session fails with the budget
/// cause, and the rejected call leaves the ledger untouched.
#[tokio::test]
async fn budget_exhaustion_mid_session() {
    let world = World::with_budget(1_000_000).await;
    let day = world.clock.utc_day().to_string();
    world
        .fast
        .adjust_budget(TENANT, &day, 950_000)
        .await
        .unwrap();

    let session_id = advance_to_analyze(&world).await;
    world.drain_workers().await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(record.fail_cause.as_ref().unwrap().code, FailCode::BudgetExceeded);

    let (_, spent) = world.fast.read_budget(TENANT).await.unwrap().unwrap();
    assert_eq!(spent, 950_000, "rejected call left spent_today unchanged");
    assert!(world.ai.requests().is_empty(), "the model was never called");
}

/// `#save` no longer matches; the classifier returns a new
/// selector; the retried step succeeds and the durable result carries
/// the healed selector.
#[tokio::test]
async fn locator_heal_patches_step_and_result() {
    let world = World::new().await;

    world.ai.push_json(steps_response(serde_json::json!([
        {"step_number": 1, "action": "click", "selector": "#save",
         "description": "save the record"},
    ])));
    world.ai.push_json(serde_json::json!({
        "kind": "locator_changed", "new_selector": "#save-btn"
    }));
    world.ai.push_json(clean_page_verdict(&["record"]));

    let session_id = world.start_session().await;
    let failed_once = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let failed_once_inner = failed_once.clone();
    let agent: Box<AgentScript> = Box::new(move |params| match params {
        AgentTaskParams::Login { .. } => (
            true,
            serde_json::json!({"success": true, "dashboard_url": "https://t/home"}),
        ),
        AgentTaskParams::NavigateToForm { .. } => (true, serde_json::json!({"success": true})),
        AgentTaskParams::ExtractDom {} => (
            true,
            serde_json::json!({"dom_html": "<form><button id='save-btn'/></form>"}),
        ),
        AgentTaskParams::ExecStep { step } if step.selector == "#save" => {
            failed_once_inner.store(true, std::sync::atomic::Ordering::SeqCst);
            (
                false,
                serde_json::json!({
                    "success": false,
                    "error": "no element matches #save",
                    "dom_html": "<form><button id='save-btn'/></form>",
                }),
            )
        }
        AgentTaskParams::ExecStep { .. } => (true, serde_json::json!({"success": true})),
        _ => (true, serde_json::json!({"success": true})),
    });
    world.run_to_completion(&session_id, &*agent).await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Completed);
    assert!(record.stages_updated);
    assert!(failed_once.load(std::sync::atomic::Ordering::SeqCst));

    let row = world
        .intake
        .repos()
        .results
        .get(ROUTE, 1)
        .await
        .unwrap()
        .expect("committed result");
    assert_eq!(row.steps[0].stage.selector, "#save-btn");
}

/// Tasks queued for user U1 are invisible to U2's agent.
#[tokio::test]
async fn cross_user_queue_isolation() {
    let world = World::new().await;
    let msg = AgentQueueMessage {
        task_id: TaskId::from_string("task-u1"),
        task_type: AgentTaskKind::ExtractDom,
        tenant_id: TenantId(1),
        user_id: UserId(1),
    };
    world.fast.push_agent_task(UserId(1), &msg).await.unwrap();

    let now = world.clock.epoch_ms();
    assert!(world.fast.pop_agent_task(UserId(2), now).await.unwrap().is_none());
    let popped = world
        .fast
        .pop_agent_task(UserId(1), now)
        .await
        .unwrap()
        .expect("owner sees the task");
    assert_eq!(popped.task_id, "task-u1");
}

/// A failed verify assertion ends the session with the verification
/// detail, not a recovery loop.
#[tokio::test]
async fn verify_assertion_failure_is_terminal() {
    let world = World::new().await;
    world.ai.push_json(steps_response(serde_json::json!([
        {"step_number": 1, "action": "verify", "selector": "",
         "description": "order total equals 42.00"},
    ])));

    let session_id = world.start_session().await;
    let agent: Box<AgentScript> = Box::new(|params| match params {
        AgentTaskParams::ExecStep { step } if step.action == fl_core::StepAction::Verify => (
            false,
            serde_json::json!({"success": false, "error": "total shows 41.00"}),
        ),
        AgentTaskParams::Login { .. } => (
            true,
            serde_json::json!({"success": true, "dashboard_url": "https://t/home"}),
        ),
        AgentTaskParams::ExtractDom {} => {
            (true, serde_json::json!({"dom_html": "<form/>"}))
        }
        _ => (true, serde_json::json!({"success": true})),
    });
    world.run_to_completion(&session_id, &*agent).await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Failed);
    let cause = record.fail_cause.unwrap();
    assert_eq!(cause.code, FailCode::VerificationFailed);
    assert!(cause.message.contains("41.00"));
}
