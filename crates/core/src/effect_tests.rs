// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::stage::StepAction;
use crate::task::TaskName;

#[test]
fn login_dispatch_carries_no_credentials() {
    let json = serde_json::to_value(&AgentDispatch::Login).unwrap();
    assert_eq!(json, serde_json::json!({"kind": "login"}));
}

#[test]
fn dispatch_effect_fields_include_delay() {
    let effect = Effect::DispatchAgent {
        user_id: UserId(7),
        dispatch: AgentDispatch::ExecStep {
            step: Stage::new(1, StepAction::Click, "#save"),
        },
        delay_ms: Some(60_000),
    };
    assert_eq!(effect.name(), "dispatch_agent");
    let fields = effect.fields();
    assert!(fields.contains(&("user_id", "7".to_string())));
    assert!(fields.contains(&("delay_ms", "60000".to_string())));
}

#[test]
fn enqueue_effect_round_trips() {
    let effect = Effect::EnqueueWorker {
        envelope: WorkerEnvelope {
            task: TaskName::EvaluatePaths,
            session_id: SessionId::from_string("sess-x"),
            args: serde_json::Value::Null,
            dispatched_at_ms: 1,
            session_version: 2,
        },
    };
    let json = serde_json::to_string(&effect).unwrap();
    let back: Effect = serde_json::from_str(&json).unwrap();
    assert_eq!(back, effect);
}
