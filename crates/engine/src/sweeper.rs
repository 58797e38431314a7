// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic sweeps: offline agents, timed-out sessions, budget flush.
//!
//! The fast-store TTL is only a backstop; the sweeper is what turns a
//! silently expired session into a durable `failed/timeout` row.

use fl_core::{Clock, SessionEvent};
use fl_store::TenantRepo;

use crate::error::EngineError;
use crate::intake::Intake;

/// Outcome counts of one sweep, for operator logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub agents_marked_offline: u64,
    pub sessions_timed_out: u64,
    pub budgets_flushed: u64,
}

pub struct Sweeper<C: Clock> {
    intake: Intake<C>,
}

impl<C: Clock> Sweeper<C> {
    pub fn new(intake: Intake<C>) -> Self {
        Self { intake }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();
        let now_ms = self.intake.clock().epoch_ms();
        let config = self.intake.config();

        // Agents that stopped heartbeating go offline.
        report.agents_marked_offline = self
            .intake
            .repos()
            .agents
            .sweep_offline(config.heartbeat_offline_secs * 1000, now_ms)
            .await?;

        // Sessions still "running" in the durable row but past their
        // lifetime get a timeout input; if the fast-store key already
        // expired, the row is closed directly.
        let cutoff = now_ms.saturating_sub(config.session_ttl_secs * 1000);
        let stale = self
            .intake
            .repos()
            .sessions
            .stale_non_terminal(cutoff)
            .await?;
        for session_id in stale {
            if self.intake.fast().session_exists(&session_id).await? {
                self.intake
                    .submit(&session_id, SessionEvent::Timeout, None)
                    .await?;
            } else {
                self.intake
                    .repos()
                    .sessions
                    .set_status(
                        &session_id,
                        "failed",
                        Some(&fl_core::FailCause::timeout()),
                        now_ms,
                    )
                    .await?;
            }
            report.sessions_timed_out += 1;
        }

        // Budget counters to the durable ledger.
        for tenant_id in self.intake.fast().budget_tenants().await? {
            if let Some((day, spent)) = self.intake.fast().read_budget(tenant_id).await? {
                TenantRepo::flush_spend(
                    self.intake.repos().tenants.as_ref(),
                    tenant_id,
                    &day,
                    spent,
                )
                .await?;
                report.budgets_flushed += 1;
            }
        }

        tracing::info!(
            agents_offline = report.agents_marked_offline,
            sessions_timed_out = report.sessions_timed_out,
            budgets_flushed = report.budgets_flushed,
            "sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
