// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn key() -> ObjectKey {
    ObjectKey::new(
        ObjectKind::Screenshot,
        TenantId(7),
        ProjectId(3),
        SessionId::from_string("sess-abc123"),
        "step-4.png",
    )
    .unwrap()
}

#[test]
fn render_follows_the_key_shape() {
    assert_eq!(key().render(), "screenshots/7/3/sess-abc123/step-4.png");
}

#[test]
fn parse_round_trips() {
    let parsed = ObjectKey::parse("screenshots/7/3/sess-abc123/step-4.png").unwrap();
    assert_eq!(parsed, key());
}

#[parameterized(
    too_few = { "screenshots/7/3/file.png" },
    too_many = { "screenshots/7/3/sess-a/extra/file.png" },
    bad_kind = { "movies/7/3/sess-a/file.png" },
    bad_tenant = { "screenshots/seven/3/sess-a/file.png" },
    bad_session = { "screenshots/7/3/task-a/file.png" },
    traversal = { "screenshots/7/3/sess-a/..%2fescape" },
)]
fn malformed_keys_are_rejected(raw: &str) {
    assert!(ObjectKey::parse(raw).is_err(), "accepted: {raw}");
}

#[test]
fn parse_for_tenant_rejects_cross_tenant_keys() {
    let raw = "screenshots/7/3/sess-abc123/step-4.png";
    assert!(ObjectKey::parse_for_tenant(raw, TenantId(7)).is_ok());
    assert!(ObjectKey::parse_for_tenant(raw, TenantId(8)).is_err());
}

#[test]
fn filenames_with_separators_are_rejected() {
    let result = ObjectKey::new(
        ObjectKind::Dom,
        TenantId(1),
        ProjectId(1),
        SessionId::from_string("sess-a"),
        "../../etc/passwd",
    );
    assert!(result.is_err());
}

#[test]
fn session_prefix_ends_with_slash() {
    let prefix = ObjectKey::session_prefix(
        ObjectKind::LogBundle,
        TenantId(7),
        ProjectId(3),
        &SessionId::from_string("sess-abc123"),
    );
    assert_eq!(prefix, "logs/7/3/sess-abc123/");
}
