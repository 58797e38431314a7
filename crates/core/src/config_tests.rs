// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn with_required_env(f: impl FnOnce()) {
    std::env::set_var("DATABASE_URL", "postgres://localhost/formloom");
    std::env::set_var("S3_BUCKET", "formloom-assets");
    std::env::set_var("JWT_SECRET", "test-secret");
    f();
    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("S3_BUCKET");
    std::env::remove_var("JWT_SECRET");
}

#[test]
#[serial]
fn defaults_apply_when_unset() {
    with_required_env(|| {
        let config = Config::from_env().unwrap();
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.session_ttl_secs, 7200);
        assert_eq!(config.presign_ttl_secs, 900);
        assert_eq!(config.secret_cache_ttl_secs, 300);
        assert_eq!(config.log_blob_threshold_bytes, 50 * 1024);
        assert_eq!(config.redis_url(), "redis://127.0.0.1:6379/0");
    });
}

#[test]
#[serial]
fn missing_database_url_is_an_error() {
    std::env::remove_var("DATABASE_URL");
    std::env::set_var("S3_BUCKET", "b");
    std::env::set_var("JWT_SECRET", "s");
    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar("DATABASE_URL")));
    std::env::remove_var("S3_BUCKET");
    std::env::remove_var("JWT_SECRET");
}

#[test]
#[serial]
fn call_cost_uses_both_token_prices() {
    with_required_env(|| {
        let config = Config::from_env().unwrap();
        // 1000 input at 3 µ$ + 100 output at 15 µ$
        assert_eq!(config.call_cost_micros(1000, 100), 3_000 + 1_500);
    });
}
