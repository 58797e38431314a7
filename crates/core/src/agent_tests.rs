// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn api_keys_are_64_alphanumeric_chars() {
    let key = generate_api_key();
    assert_eq!(key.len(), API_KEY_LEN);
    assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn api_keys_are_unique() {
    assert_ne!(generate_api_key(), generate_api_key());
}

#[test]
fn heartbeat_staleness_uses_threshold() {
    let agent = AgentRecord::builder().last_heartbeat_ms(10_000).build();
    assert!(!agent.heartbeat_stale(100_000, 120_000));
    assert!(agent.heartbeat_stale(200_000, 120_000));
}

#[test]
fn heartbeat_staleness_survives_clock_skew() {
    // A heartbeat stamped in the future must not underflow.
    let agent = AgentRecord::builder().last_heartbeat_ms(500_000).build();
    assert!(!agent.heartbeat_stale(100_000, 120_000));
}

#[test]
fn status_serde_is_snake_case() {
    assert_eq!(serde_json::to_string(&AgentStatus::Offline).unwrap(), "\"offline\"");
}
