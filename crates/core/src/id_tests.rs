// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn session_id_has_prefix() {
    let id = SessionId::new();
    assert!(id.as_str().starts_with("sess-"));
    assert_eq!(id.as_str().len(), 24);
}

#[test]
fn task_id_is_uuid_suffixed() {
    let id = TaskId::new();
    assert!(id.as_str().starts_with("task-"));
    // 5-char prefix + 36-char hyphenated uuid
    assert_eq!(id.as_str().len(), 41);
}

#[test]
fn id_from_str_round_trips() {
    let id = SessionId::from_string("sess-abc123");
    assert_eq!(id.as_str(), "sess-abc123");
    assert_eq!(id, "sess-abc123");
}

#[test]
fn id_serde_is_transparent() {
    let id = AgentId::from_string("agt-x");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"agt-x\"");
    let parsed: AgentId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn oversized_id_fails_to_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    assert!(serde_json::from_str::<SessionId>(&long).is_err());
}

#[test]
fn row_id_serde_is_numeric() {
    let id = TenantId(42);
    assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    let parsed: TenantId = serde_json::from_str("42").unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn generated_ids_are_unique() {
    let a = SessionId::new();
    let b = SessionId::new();
    assert_ne!(a, b);
}
