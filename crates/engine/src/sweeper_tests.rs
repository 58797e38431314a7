// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use fl_core::{
    ActivityKind, AgentRecord, Config, FakeClock, FormRouteId, NetworkId, NewSession, Phase,
    ProjectId, RouteSnapshot, SessionConfig, TenantId, UserId,
};
use fl_store::{AgentRepo, FastStore, MemoryRepos, MemoryStore, NetworkCredentials};
use fl_vault::{FakeKms, SecretStore};

use super::*;

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        redis_host: String::new(),
        redis_port: 0,
        database_url: String::new(),
        s3_bucket: String::new(),
        aws_region: String::new(),
        kms_key_id: None,
        anthropic_api_key: Some("sk-system".into()),
        jwt_secret: String::new(),
        log_level: "info".into(),
        heartbeat_offline_secs: 120,
        session_ttl_secs: 7200,
        presign_ttl_secs: 900,
        secret_cache_ttl_secs: 300,
        log_blob_threshold_bytes: 50 * 1024,
        input_price_micros: 3,
        output_price_micros: 15,
        forecast_cost_micros: 100_000,
        ai_max_attempts: 3,
        path: Default::default(),
    })
}

struct Harness {
    sweeper: Sweeper<FakeClock>,
    intake: Intake<FakeClock>,
    fast: Arc<MemoryStore>,
    repos: MemoryRepos,
    clock: FakeClock,
}

async fn harness() -> Harness {
    let fast = Arc::new(MemoryStore::new());
    let repos = MemoryRepos::new();
    let clock = FakeClock::new();
    let vault = SecretStore::new(Arc::new(FakeKms::new()), fast.clone(), 300);
    let password_ciphertext = vault.encrypt("pw", TenantId(1)).await.unwrap();
    repos.seed_credentials(NetworkCredentials {
        network_id: NetworkId(4),
        login_url: "https://t/login".into(),
        username: "jo".into(),
        password_ciphertext,
        totp_seed_ciphertext: None,
        login_hints: None,
    });
    let intake = Intake::new(
        fast.clone(),
        repos.clone().into_repos(),
        vault,
        clock.clone(),
        test_config(),
    );
    let sweeper = Sweeper::new(intake.clone());
    Harness { sweeper, intake, fast, repos, clock }
}

fn session_params() -> NewSession {
    NewSession {
        activity: ActivityKind::FormMapping,
        tenant_id: TenantId(1),
        user_id: UserId(2),
        project_id: ProjectId(3),
        network_id: NetworkId(4),
        form_route_id: Some(FormRouteId(5)),
        test_page_id: None,
        route: RouteSnapshot::default(),
        base_url: "https://t".into(),
        test_case: None,
        config: SessionConfig::default(),
    }
}

#[tokio::test]
async fn stale_agents_are_marked_offline() {
    let h = harness().await;
    let agent = AgentRecord::builder()
        .last_heartbeat_ms(h.clock.epoch_ms())
        .build();
    h.repos.upsert(&agent).await.unwrap();

    h.clock.advance(Duration::from_secs(300));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.agents_marked_offline, 1);

    let swept = AgentRepo::get(&h.repos, &agent.id).await.unwrap().unwrap();
    assert_eq!(swept.status, fl_core::AgentStatus::Offline);
}

#[tokio::test]
async fn fresh_agents_are_left_alone() {
    let h = harness().await;
    let agent = AgentRecord::builder()
        .last_heartbeat_ms(h.clock.epoch_ms())
        .build();
    h.repos.upsert(&agent).await.unwrap();

    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.agents_marked_offline, 0);
}

#[tokio::test]
async fn overdue_session_times_out_through_intake() {
    let h = harness().await;
    let session_id = h.intake.start_session(session_params()).await.unwrap();

    h.clock.advance(Duration::from_secs(7201));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.sessions_timed_out, 1);

    let record = h.fast.load_session(&session_id).await.unwrap().unwrap();
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(
        record.fail_cause.as_ref().unwrap().code,
        fl_core::FailCode::Timeout
    );
    let status = h.intake.repos().sessions.status(&session_id).await.unwrap();
    assert_eq!(status.as_deref(), Some("failed"));
}

#[tokio::test]
async fn expired_fast_key_closes_the_durable_row() {
    let h = harness().await;
    let session_id = h.intake.start_session(session_params()).await.unwrap();
    h.fast.expire_session(&session_id);

    h.clock.advance(Duration::from_secs(7201));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.sessions_timed_out, 1);

    let status = h.intake.repos().sessions.status(&session_id).await.unwrap();
    assert_eq!(status.as_deref(), Some("failed"));
    let cause = h.repos.session_cause(&session_id).unwrap();
    assert_eq!(cause.code, fl_core::FailCode::Timeout);
}

#[tokio::test]
async fn budget_counters_flush_to_the_ledger() {
    let h = harness().await;
    h.fast
        .adjust_budget(TenantId(9), "2026-01-01", 123_000)
        .await
        .unwrap();

    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.budgets_flushed, 1);
    assert_eq!(
        h.repos.flushed_spend(TenantId(9)),
        Some(("2026-01-01".to_string(), 123_000))
    );
}
