// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget gate: the single checkpoint in front of every AI call.
//!
//! Reserve-before-call: the worst-case forecast is added to the
//! tenant's counter atomically, then settled against the observed cost
//! (or released entirely) once the call returns. The daily sum of
//! recorded costs can therefore never exceed the budget by more than
//! one forecast.

use std::sync::Arc;

use thiserror::Error;

use fl_core::{Clock, Config, TenantAccess, TenantId};
use fl_store::{FastStore, StoreError, TenantRepo};
use fl_vault::{SecretKind, SecretStore};

/// Denials surfaced to the caller and, through it, to the user.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("access denied for tenant {tenant_id}: {reason}")]
    AccessDenied { tenant_id: i64, reason: String },

    #[error("daily AI budget exceeded for tenant {tenant_id}")]
    BudgetExceeded { tenant_id: i64, spent_micros: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] fl_vault::VaultError),
}

/// A granted reservation: the key to call with and what it may cost.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub api_key: String,
    pub remaining_micros: i64,
    pub reserved_micros: i64,
}

/// The gate itself.
#[derive(Clone)]
pub struct BudgetGate<C: Clock> {
    tenants: Arc<dyn TenantRepo>,
    fast: Arc<dyn FastStore>,
    vault: SecretStore,
    clock: C,
    config: Arc<Config>,
}

impl<C: Clock> BudgetGate<C> {
    pub fn new(
        tenants: Arc<dyn TenantRepo>,
        fast: Arc<dyn FastStore>,
        vault: SecretStore,
        clock: C,
        config: Arc<Config>,
    ) -> Self {
        Self { tenants, fast, vault, clock, config }
    }

    /// Check access and atomically reserve the forecast cost.
    pub async fn check(&self, tenant_id: TenantId) -> Result<GateDecision, GateError> {
        let access = self
            .tenants
            .access(tenant_id)
            .await?
            .ok_or_else(|| GateError::AccessDenied {
                tenant_id: tenant_id.0,
                reason: "no access record".into(),
            })?;

        self.check_access(&access)?;
        let api_key = self.resolve_api_key(&access).await?;

        let today = self.clock.utc_day().to_string();
        let forecast = self.config.forecast_cost_micros;
        let reserve = self
            .fast
            .reserve_budget(tenant_id, &today, forecast, access.daily_budget_micros)
            .await?;
        if !reserve.allowed {
            return Err(GateError::BudgetExceeded {
                tenant_id: tenant_id.0,
                spent_micros: reserve.spent_micros,
            });
        }

        Ok(GateDecision {
            api_key,
            remaining_micros: access.daily_budget_micros - reserve.spent_micros,
            reserved_micros: forecast,
        })
    }

    fn check_access(&self, access: &TenantAccess) -> Result<(), GateError> {
        let deny = |reason: &str| GateError::AccessDenied {
            tenant_id: access.tenant_id.0,
            reason: reason.to_string(),
        };

        match access.status {
            fl_core::AccessStatus::Active => {}
            fl_core::AccessStatus::Pending => return Err(deny("access request pending")),
            fl_core::AccessStatus::Rejected => return Err(deny("access request rejected")),
        }

        match access.model {
            fl_core::AccessModel::EarlyAccess => {
                if access.trial_expired(self.clock.epoch_ms()) {
                    return Err(deny("early-access trial expired"));
                }
                if access.daily_budget_micros <= 0 {
                    return Err(deny("early-access tenant has no funded daily budget"));
                }
            }
            fl_core::AccessModel::Byok => {
                if access.api_key_ciphertext.is_none() {
                    return Err(deny("no API key stored for BYOK tenant"));
                }
            }
        }
        Ok(())
    }

    async fn resolve_api_key(&self, access: &TenantAccess) -> Result<String, GateError> {
        match (&access.model, &access.api_key_ciphertext) {
            (fl_core::AccessModel::Byok, Some(ciphertext)) => Ok(self
                .vault
                .decrypt_cached(ciphertext, access.tenant_id, SecretKind::ApiKey, None)
                .await?),
            _ => self
                .config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| GateError::AccessDenied {
                    tenant_id: access.tenant_id.0,
                    reason: "no system model key configured".into(),
                }),
        }
    }

    /// Settle a reservation against the observed token usage.
    pub async fn record_usage(
        &self,
        tenant_id: TenantId,
        reserved_micros: i64,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<i64, GateError> {
        let observed = self.config.call_cost_micros(input_tokens, output_tokens);
        let today = self.clock.utc_day().to_string();
        let spent = self
            .fast
            .adjust_budget(tenant_id, &today, observed - reserved_micros)
            .await?;
        tracing::debug!(
            tenant_id = tenant_id.0,
            observed_micros = observed,
            spent_micros = spent,
            "recorded AI usage"
        );
        Ok(spent)
    }

    /// Release an unused reservation after a failed call.
    pub async fn release(
        &self,
        tenant_id: TenantId,
        reserved_micros: i64,
    ) -> Result<(), GateError> {
        let today = self.clock.utc_day().to_string();
        self.fast
            .adjust_budget(tenant_id, &today, -reserved_micros)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
