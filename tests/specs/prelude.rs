// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared world harness: intake + workers over memory fakes, with a
//! scripted model and a scriptable agent.

use std::sync::Arc;
use std::time::Duration;

use fl_core::{
    ActivityKind, AgentTaskParams, AgentTaskStatus, Clock, Config, FakeClock, FormRouteId,
    NetworkId, NewSession, ProjectId, RouteSnapshot, SessionConfig, SessionEvent, SessionId,
    TenantAccess, TenantId, UserId, WorkerQueue,
};
use fl_engine::{BudgetGate, FakeAi, Intake, Worker};
use fl_store::{FastStore, FormRouteRow, MemoryRepos, MemoryStore, NetworkCredentials, TaskRepo};
use fl_vault::{FakeKms, SecretStore};

pub const TENANT: TenantId = TenantId(1);
pub const USER: UserId = UserId(2);
pub const ROUTE: FormRouteId = FormRouteId(5);

/// How the scripted agent answers one task.
pub type AgentScript = dyn Fn(&AgentTaskParams) -> (bool, serde_json::Value) + Send + Sync;

pub struct World {
    pub intake: Intake<FakeClock>,
    pub workers: Vec<Worker<FakeClock>>,
    pub fast: Arc<MemoryStore>,
    pub repos: MemoryRepos,
    pub ai: FakeAi,
    pub clock: FakeClock,
}

pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        redis_host: String::new(),
        redis_port: 0,
        database_url: String::new(),
        s3_bucket: String::new(),
        aws_region: String::new(),
        kms_key_id: None,
        anthropic_api_key: Some("sk-system".into()),
        jwt_secret: "spec-secret".into(),
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

impl World {
    pub async fn new() -> Self {
        Self::with_budget(5_000_000).await
    }

    pub async fn with_budget(daily_budget_micros: i64) -> Self {
        let fast = Arc::new(MemoryStore::new());
        let repos = MemoryRepos::new();
        let clock = FakeClock::new();
        let vault = SecretStore::new(Arc::new(FakeKms::new()), fast.clone(), 300);
        let config = test_config();

        repos.seed_tenant(
            TenantAccess::builder()
                .tenant_id(TENANT)
                .daily_budget_micros(daily_budget_micros)
                .build(),
        );
        let password_ciphertext = vault.encrypt("hunter22", TENANT).await.unwrap();
        repos.seed_credentials(NetworkCredentials {
            network_id: NetworkId(4),
            login_url: "https://target.example.com/login".into(),
            username: "jo".into(),
            password_ciphertext,
            totp_seed_ciphertext: None,
            login_hints: None,
        });
        repos.seed_route(FormRouteRow {
            id: ROUTE,
            project_id: ProjectId(3),
            network_id: NetworkId(4),
            parent_id: None,
            route: RouteSnapshot {
                form_name: "customer".into(),
                login_url: "https://target.example.com/login".into(),
                ..RouteSnapshot::default()
            },
        });

        let intake = Intake::new(
            fast.clone(),
            repos.clone().into_repos(),
            vault.clone(),
            clock.clone(),
            config.clone(),
        );
        let gate = BudgetGate::new(
            repos.clone().into_repos().tenants,
            fast.clone(),
            vault,
            clock.clone(),
            config,
        );
        let ai = FakeAi::new();
        let workers = WorkerQueue::ALL
            .iter()
            .map(|queue| {
                Worker::new(*queue, intake.clone(), gate.clone(), Arc::new(ai.clone()))
            })
            .collect();

        Self { intake, workers, fast, repos, ai, clock }
    }

    pub async fn start_session(&self) -> SessionId {
        self.intake
            .start_session(NewSession {
                activity: ActivityKind::FormMapping,
                tenant_id: TENANT,
                user_id: USER,
                project_id: ProjectId(3),
                network_id: NetworkId(4),
                form_route_id: Some(ROUTE),
                test_page_id: None,
                route: RouteSnapshot {
                    form_name: "customer".into(),
                    login_url: "https://target.example.com/login".into(),
                    ..RouteSnapshot::default()
                },
                base_url: "https://target.example.com".into(),
                test_case: None,
                config: SessionConfig::default(),
            })
            .await
            .unwrap()
    }

    /// Drain every worker queue until all are empty.
    pub async fn drain_workers(&self) {
        loop {
            let mut did_work = false;
            for worker in &self.workers {
                while worker.tick().await.unwrap() {
                    did_work = true;
                }
            }
            if !did_work {
                break;
            }
        }
    }

    /// Pop one agent task and answer it with the script, the way the
    /// server's task-result route would.
    pub async fn agent_turn(&self, script: &AgentScript) -> bool {
        let now = self.clock.epoch_ms();
        let Some(msg) = self.fast.pop_agent_task(USER, now).await.unwrap() else {
            return false;
        };
        let task = TaskRepo::get(&self.repos, &msg.task_id)
            .await
            .unwrap()
            .expect("queued task has a row");

        let (success, result) = script(&task.params);
        let status = if success {
            AgentTaskStatus::Completed
        } else {
            AgentTaskStatus::Failed
        };
        let error = (!success)
            .then(|| result.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .flatten();
        TaskRepo::complete(&self.repos, &task.id, status, Some(result.clone()), error.clone(), now)
            .await
            .unwrap();

        if let Some(session_id) = task.session_id {
            self.intake
                .submit(
                    &session_id,
                    SessionEvent::AgentResult {
                        task_id: task.id,
                        kind: task.params.kind(),
                        success,
                        result: Some(result),
                        error,
                    },
                    None,
                )
                .await
                .unwrap();
        }
        true
    }

    /// Alternate agent turns and worker drains until the session is
    /// terminal (or the iteration budget runs out).
    pub async fn run_to_completion(&self, session_id: &SessionId, script: &AgentScript) {
        for _ in 0..200 {
            self.drain_workers().await;
            if self.session(session_id).await.is_terminal() {
                return;
            }
            if !self.agent_turn(script).await {
                // Nothing ready: let delayed retries come due.
                self.clock.advance(Duration::from_secs(61));
                if !self.agent_turn(script).await {
                    self.drain_workers().await;
                    if self.session(session_id).await.is_terminal() {
                        return;
                    }
                    panic!("world stalled: no agent task, no worker task, session live");
                }
            }
        }
        panic!("session did not reach a terminal state in 200 turns");
    }

    pub async fn session(&self, session_id: &SessionId) -> fl_core::SessionRecord {
        self.fast
            .load_session(session_id)
            .await
            .unwrap()
            .expect("session record present")
    }
}

/// Standard agent behavior: everything succeeds; exec steps report
/// `fields_changed` according to `reveals(selector, value)`.
pub fn happy_agent(
    reveals: impl Fn(&str, Option<&str>) -> bool + Send + Sync + 'static,
) -> Box<AgentScript> {
    Box::new(move |params| match params {
        AgentTaskParams::Login { .. } => (
            true,
            serde_json::json!({
                "success": true,
                "dashboard_url": "https://target.example.com/home",
            }),
        ),
        AgentTaskParams::NavigateToForm { .. } => (
            true,
            serde_json::json!({"success": true, "current_url": "https://target.example.com/customers/new"}),
        ),
        AgentTaskParams::ExtractDom {} => (
            true,
            serde_json::json!({
                "dom_html": "<form id='customer'/>",
                "screenshot_key": "screenshots/1/3/sess-x/page.png",
            }),
        ),
        AgentTaskParams::ExecStep { step } => {
            let changed = reveals(&step.selector, step.value.as_deref());
            (
                true,
                serde_json::json!({
                    "success": true,
                    "dom_html": "<form id='customer'/>",
                    "screenshot_key": "screenshots/1/3/sess-x/step.png",
                    "fields_changed_hint": changed,
                }),
            )
        }
        AgentTaskParams::ExecSteps { .. } => (true, serde_json::json!({"success": true})),
        AgentTaskParams::Logout { .. } => (true, serde_json::json!({"success": true})),
    })
}

/// Model script helpers.
pub fn steps_response(steps: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "steps": steps })
}

pub fn clean_page_verdict(fields: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "ready": true,
        "failures": fields
            .iter()
            .map(|f| serde_json::json!({
                "field": f, "passed": true, "severity": "low"
            }))
            .collect::<Vec<_>>(),
    })
}
