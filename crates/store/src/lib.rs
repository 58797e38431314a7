// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-store: shared state for the orchestration core.
//!
//! Two stores, two roles. The fast store (Redis) holds everything hot:
//! session records, the queue fabric, budget counters, and the secret
//! cache. The relational store (Postgres) is authoritative for agents,
//! tasks, routes, results, tenants, and activity logs. Queue entries
//! are pointers; durability always lives in a relational row.

pub mod db;
pub mod error;
pub mod fast;

pub use db::{
    connect_pg, migrate, ActivityLogRepo, ActivityLogRow, AgentRepo, FormRouteRow,
    MappingResultRow, NetworkCredentials, PgRepos, Repos, ResultRepo, RouteRepo, SessionRepo,
    TaskRepo, TenantRepo,
};
pub use error::StoreError;
pub use fast::{BudgetReserve, FastStore, RedisStore};

#[cfg(any(test, feature = "test-support"))]
pub use db::memory::MemoryRepos;
#[cfg(any(test, feature = "test-support"))]
pub use fast::memory::MemoryStore;
