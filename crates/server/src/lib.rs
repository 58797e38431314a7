// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-server: the agent-facing HTTP surface.
//!
//! Handlers return within one network round trip: they touch the fast
//! store, the database, and nothing slower. All long work is deferred
//! to the worker queues.

mod auth;
mod error;
mod routes;

pub use error::ApiError;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use fl_core::{Clock, Config};
use fl_engine::Intake;
use fl_objstore::ObjectGateway;

/// Shared application state passed to all handlers.
pub struct AppState<C: Clock> {
    pub intake: Intake<C>,
    pub objstore: Option<ObjectGateway>,
    pub config: Arc<Config>,
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
            objstore: self.objstore.clone(),
            config: self.config.clone(),
        }
    }
}

/// Build the agent API router.
pub fn router<C: Clock>(state: AppState<C>) -> Router {
    Router::new()
        .route("/agent/register", post(routes::agent::register::<C>))
        .route("/agent/heartbeat", post(routes::agent::heartbeat::<C>))
        .route("/agent/poll-task", get(routes::agent::poll_task::<C>))
        .route("/agent/task-result", post(routes::agent::task_result::<C>))
        .route("/agent/task-progress", post(routes::agent::task_progress::<C>))
        .route(
            "/agent/regenerate-api-key",
            post(routes::agent::regenerate_api_key::<C>),
        )
        .route("/agent/logs", post(routes::logs::ingest::<C>))
        .route("/agent/logs/blob", post(routes::logs::blob_uploaded::<C>))
        .route("/agent/logs/tail", get(routes::logs::tail::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
