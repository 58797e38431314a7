// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fl: the Formloom orchestration server CLI.

mod exit;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use exit::ExitError;
use fl_core::{Config, SystemClock, WorkerQueue};
use fl_engine::{AnthropicClient, BudgetGate, Intake, Sweeper, Worker};
use fl_objstore::ObjectGateway;
use fl_store::RedisStore;
use fl_vault::{AwsKms, SecretStore};

#[derive(Parser)]
#[command(name = "fl", about = "Formloom orchestration server", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent API server.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Run a background worker for one queue.
    Worker {
        #[arg(long, value_enum)]
        queue: QueueArg,
    },
    /// Run periodic sweeps (agents, sessions, budget flush).
    Sweep {
        /// Repeat every N seconds; one sweep when omitted.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Apply database migrations.
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueueArg {
    Mapper,
    Runner,
    Forms,
}

impl From<QueueArg> for WorkerQueue {
    fn from(arg: QueueArg) -> Self {
        match arg {
            QueueArg::Mapper => WorkerQueue::Mapper,
            QueueArg::Runner => WorkerQueue::Runner,
            QueueArg::Forms => WorkerQueue::Forms,
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    fmt().json().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let config = Arc::new(Config::from_env()?);
    init_tracing(&config);

    match cli.command {
        Command::Migrate => {
            fl_store::migrate(&config.database_url).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::Serve { bind } => serve(config, &bind).await,
        Command::Worker { queue } => worker(config, queue.into()).await,
        Command::Sweep { interval_secs } => sweep(config, interval_secs).await,
    }
}

/// Build the shared service graph: stores, vault, intake.
async fn build_intake(config: &Arc<Config>) -> Result<Intake<SystemClock>, ExitError> {
    let fast = Arc::new(RedisStore::connect(&config.redis_url()).await?);
    let repos = fl_store::connect_pg(&config.database_url).await?;
    let kms = AwsKms::from_env(config.kms_key_id.clone()).await;
    let vault = SecretStore::new(Arc::new(kms), fast.clone(), config.secret_cache_ttl_secs);
    Ok(Intake::new(fast, repos, vault, SystemClock, config.clone()))
}

async fn serve(config: Arc<Config>, bind: &str) -> Result<(), ExitError> {
    let intake = build_intake(&config).await?;
    let objstore =
        ObjectGateway::from_env(config.s3_bucket.clone(), config.presign_ttl_secs).await;

    let app = fl_server::router(fl_server::AppState {
        intake,
        objstore: Some(objstore),
        config: config.clone(),
    });
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ExitError::infra(format!("cannot bind {bind}: {e}")))?;
    tracing::info!(%bind, "agent API listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| ExitError::infra(e.to_string()))
}

async fn worker(config: Arc<Config>, queue: WorkerQueue) -> Result<(), ExitError> {
    let intake = build_intake(&config).await?;
    let gate = BudgetGate::new(
        intake.repos().tenants.clone(),
        intake.fast().clone(),
        SecretStore::new(
            Arc::new(AwsKms::from_env(config.kms_key_id.clone()).await),
            intake.fast().clone(),
            config.secret_cache_ttl_secs,
        ),
        SystemClock,
        config.clone(),
    );
    let ai = Arc::new(AnthropicClient::new(config.ai_max_attempts));
    let objstore =
        ObjectGateway::from_env(config.s3_bucket.clone(), config.presign_ttl_secs).await;

    let worker = Worker::new(queue, intake, gate, ai).with_objstore(objstore);
    worker.run().await;
    Ok(())
}

async fn sweep(config: Arc<Config>, interval_secs: Option<u64>) -> Result<(), ExitError> {
    let intake = build_intake(&config).await?;
    let sweeper = Sweeper::new(intake);

    match interval_secs {
        None => {
            sweeper.sweep_once().await?;
            Ok(())
        }
        Some(secs) => loop {
            if let Err(err) = sweeper.sweep_once().await {
                tracing::error!(error = %err, "sweep failed");
            }
            tokio::time::sleep(Duration::from_secs(secs)).await;
        },
    }
}
