// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fl_core::Clock;
use http_body_util::BodyExt;
use tower::ServiceExt;

use fl_core::{
    AgentQueueMessage, AgentRecord, AgentTaskKind, AgentTaskParams, AgentTaskRecord, Config,
    FakeClock, SessionId, TaskId, TenantId, UserId,
};
use fl_engine::Intake;
use fl_store::{FastStore, MemoryRepos, MemoryStore, TaskRepo};
use fl_vault::{FakeKms, SecretStore};

use crate::auth::API_KEY_HEADER;
use crate::{router, AppState};

struct Harness {
    app: Router,
    fast: Arc<MemoryStore>,
    repos: MemoryRepos,
    clock: FakeClock,
}

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        redis_host: String::new(),
        redis_port: 0,
        database_url: String::new(),
        s3_bucket: String::new(),
        aws_region: String::new(),
        kms_key_id: None,
        anthropic_api_key: None,
        jwt_secret: "test-jwt-secret".into(),
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

fn harness() -> Harness {
    let fast = Arc::new(MemoryStore::new());
    let repos = MemoryRepos::new();
    let clock = FakeClock::new();
    let vault = SecretStore::new(Arc::new(FakeKms::new()), fast.clone(), 300);
    let intake = Intake::new(
        fast.clone(),
        repos.clone().into_repos(),
        vault,
        clock.clone(),
        test_config(),
    );
    let app = router(AppState { intake, objstore: None, config: test_config() });
    Harness { app, fast, repos, clock }
}

async fn seed_agent(h: &Harness, agent_id: &str, user: i64, api_key: &str) -> AgentRecord {
    let record = AgentRecord::builder()
        .id(agent_id)
        .user_id(UserId(user))
        .api_key(api_key)
        .build();
    fl_store::AgentRepo::upsert(&h.repos, &record).await.unwrap();
    record
}

async fn seed_task(h: &Harness, user: i64) -> TaskId {
    let task = AgentTaskRecord::new(
        TenantId(1),
        UserId(user),
        AgentTaskParams::ExtractDom {},
        Some(SessionId::from_string("sess-x")),
        h.clock.epoch_ms(),
    );
    TaskRepo::insert(&h.repos, &task).await.unwrap();
    h.fast
        .push_agent_task(
            UserId(user),
            &AgentQueueMessage {
                task_id: task.id,
                task_type: AgentTaskKind::ExtractDom,
                tenant_id: TenantId(1),
                user_id: UserId(user),
            },
        )
        .await
        .unwrap();
    task.id
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, api_key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn anonymous_requests_are_rejected() {
    let h = harness();
    let response = h.app.oneshot(get("/agent/poll-task?agent_id=agt-a", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_api_key_is_rejected() {
    let h = harness();
    let response = h
        .app
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("wrong-key")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_id_mismatch_is_forbidden() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    let response = h
        .app
        .oneshot(get("/agent/poll-task?agent_id=agt-other", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_queue_returns_204() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    let response = h
        .app
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn poll_returns_the_task_and_assigns_it() {
    let h = harness();
    let agent = seed_agent(&h, "agt-a", 1, "key-a").await;
    let task_id = seed_task(&h, 1).await;

    let response = h
        .app
        .clone()
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["task_id"], task_id.as_str());
    assert_eq!(body["task_type"], "extract_dom");

    let stored = TaskRepo::get(&h.repos, &task_id).await.unwrap().unwrap();
    assert_eq!(stored.status, fl_core::AgentTaskStatus::Assigned);
    assert_eq!(stored.agent_id, Some(agent.id));
}

#[tokio::test]
async fn queue_isolation_across_users() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    seed_agent(&h, "agt-b", 2, "key-b").await;
    let task_id = seed_task(&h, 1).await;

    // U2's agent polls first: nothing for it.
    let response = h
        .app
        .clone()
        .oneshot(get("/agent/poll-task?agent_id=agt-b", Some("key-b")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // U1's agent gets the task.
    let response = h
        .app
        .clone()
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["task_id"], task_id.as_str());
}

#[tokio::test]
async fn dangling_queue_entry_returns_204() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    h.fast
        .push_agent_task(
            UserId(1),
            &AgentQueueMessage {
                task_id: TaskId::from_string("task-ghost"),
                task_type: AgentTaskKind::ExtractDom,
                tenant_id: TenantId(1),
                user_id: UserId(1),
            },
        )
        .await
        .unwrap();

    let response = h
        .app
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn register_returns_a_key_once_and_reuses_it() {
    let h = harness();
    let body = serde_json::json!({
        "agent_id": "agt-new",
        "tenant_id": 1,
        "user_id": 7,
        "hostname": "laptop",
        "platform": "windows",
        "version": "2.1.0",
    });

    let response = h
        .app
        .clone()
        .oneshot(post("/agent/register", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = json_body(response).await;
    let key = first["api_key"].as_str().unwrap().to_string();
    assert_eq!(key.len(), fl_core::agent::API_KEY_LEN);

    // Re-registration keeps the key.
    let response = h.app.clone().oneshot(post("/agent/register", None, body)).await.unwrap();
    let second = json_body(response).await;
    assert_eq!(second["api_key"], key.as_str());
}

#[tokio::test]
async fn heartbeat_updates_the_record() {
    let h = harness();
    let agent = seed_agent(&h, "agt-a", 1, "key-a").await;
    h.clock.advance(std::time::Duration::from_secs(30));

    let response = h
        .app
        .oneshot(post(
            "/agent/heartbeat",
            Some("key-a"),
            serde_json::json!({"status": "busy", "current_task_id": "task-t"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = fl_store::AgentRepo::get(&h.repos, &agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, fl_core::AgentStatus::Busy);
    assert_eq!(stored.last_heartbeat_ms, h.clock.epoch_ms());
}

#[tokio::test]
async fn task_result_requires_assignment() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    seed_agent(&h, "agt-b", 2, "key-b").await;
    let task_id = seed_task(&h, 1).await;

    // Assign to agent A by polling.
    h.app
        .clone()
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();

    // Agent B cannot post the result.
    let response = h
        .app
        .oneshot(post(
            "/agent/task-result",
            Some("key-b"),
            serde_json::json!({"task_id": task_id, "status": "completed", "result": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_task_result_is_accepted_and_ignored() {
    let h = harness();
    seed_agent(&h, "agt-a", 1, "key-a").await;
    let task_id = seed_task(&h, 1).await;
    h.app
        .clone()
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();

    let body = serde_json::json!({
        "task_id": task_id,
        "status": "completed",
        "result": {"dom_html": "<form/>"},
    });
    let first = h
        .app
        .clone()
        .oneshot(post("/agent/task-result", Some("key-a"), body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = h
        .app
        .oneshot(post("/agent/task-result", Some("key-a"), body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let stored = TaskRepo::get(&h.repos, &task_id).await.unwrap().unwrap();
    assert_eq!(stored.status, fl_core::AgentTaskStatus::Completed);
}

#[tokio::test]
async fn key_rotation_needs_user_auth_and_ownership() {
    let h = harness();
    seed_agent(&h, "agt-a", 7, "key-a").await;

    // No bearer token: rejected.
    let response = h
        .app
        .clone()
        .oneshot(post(
            "/agent/regenerate-api-key",
            None,
            serde_json::json!({"agent_id": "agt-a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Token for the owning user: rotated.
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({"sub": 7, "exp": 33_000_000_000u64}),
        &jsonwebtoken::EncodingKey::from_secret(b"test-jwt-secret"),
    )
    .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/agent/regenerate-api-key")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(
            serde_json::json!({"agent_id": "agt-a"}).to_string(),
        ))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_ne!(body["api_key"], "key-a");

    // The old key no longer authenticates.
    let response = h
        .app
        .oneshot(get("/agent/poll-task?agent_id=agt-a", Some("key-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
