// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant access records: who may call the model, and on whose dime.

use serde::{Deserialize, Serialize};

use crate::id::TenantId;

/// Tenant access state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Active,
    Pending,
    Rejected,
}

crate::simple_display! {
    AccessStatus {
        Active => "active",
        Pending => "pending",
        Rejected => "rejected",
    }
}

/// How a tenant pays for AI calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessModel {
    /// Tenant supplies their own model API key.
    Byok,
    /// Time-limited trial with a server-funded daily budget.
    EarlyAccess,
}

crate::simple_display! {
    AccessModel {
        Byok => "byok",
        EarlyAccess => "early_access",
    }
}

/// Tenant access record, cached in front of the budget gate.
///
/// Budget amounts are integer micro-USD so the fast-store increment is
/// exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAccess {
    pub tenant_id: TenantId,
    pub status: AccessStatus,
    pub model: AccessModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_start_ms: Option<u64>,
    #[serde(default)]
    pub trial_days: u32,
    pub daily_budget_micros: i64,
    /// KMS-encrypted BYOK model key, when stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_ciphertext: Option<String>,
    /// When set, AI prompts/responses appear verbatim in session logs.
    #[serde(default)]
    pub debug_mode: bool,
}

impl TenantAccess {
    pub fn trial_expired(&self, now_ms: u64) -> bool {
        match self.trial_start_ms {
            Some(start) => {
                let window_ms = u64::from(self.trial_days) * 24 * 3600 * 1000;
                now_ms > start.saturating_add(window_ms)
            }
            None => false,
        }
    }
}

crate::builder! {
    pub struct TenantAccessBuilder => TenantAccess {
        set {
            tenant_id: TenantId = TenantId(1),
            status: AccessStatus = AccessStatus::Active,
            model: AccessModel = AccessModel::EarlyAccess,
            trial_days: u32 = 14,
            daily_budget_micros: i64 = 5_000_000,
            debug_mode: bool = false,
        }
        option {
            trial_start_ms: u64 = None,
            api_key_ciphertext: String = None,
        }
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
