// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const DAY_MS: u64 = 24 * 3600 * 1000;

#[test]
fn trial_without_start_never_expires() {
    let tenant = TenantAccess::builder().build();
    assert!(!tenant.trial_expired(u64::MAX));
}

#[test]
fn trial_expires_after_window() {
    let tenant = TenantAccess::builder()
        .trial_start_ms(1_000_000u64)
        .trial_days(14u32)
        .build();
    assert!(!tenant.trial_expired(1_000_000 + 14 * DAY_MS));
    assert!(tenant.trial_expired(1_000_000 + 14 * DAY_MS + 1));
}

#[test]
fn access_enums_serialize_snake_case() {
    assert_eq!(serde_json::to_string(&AccessModel::EarlyAccess).unwrap(), "\"early_access\"");
    assert_eq!(serde_json::to_string(&AccessStatus::Rejected).unwrap(), "\"rejected\"");
}
