// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy shared across the orchestration core.
//!
//! A [`FailCause`] is the machine-readable terminal outcome attached to
//! a session that ends in `failed`. It is what the UI renders and what
//! tests assert on.

use serde::{Deserialize, Serialize};

/// Machine-readable failure codes for terminal session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailCode {
    /// Tenant has no active access (pending, rejected, expired trial,
    /// missing BYOK key).
    AccessDenied,
    /// Daily AI budget would be exceeded by the next call.
    BudgetExceeded,
    /// Recovery attempts exhausted for a failing step.
    RecoveryExhausted,
    /// A `verify` assertion failed; not recoverable.
    VerificationFailed,
    /// The model returned unparseable output twice.
    AiParseError,
    /// Page-general error persisted past the bounded wait-and-retry.
    PageUnavailable,
    /// A junction override could not be re-matched after a recovery
    /// splice; the path is ended rather than committing a wrong option.
    JunctionOverrideLost,
    /// Agent-side failure with no applicable recovery.
    AgentError,
    /// Session exceeded its lifetime and was swept.
    Timeout,
    /// Internal invariant violation or infrastructure failure.
    Internal,
}

crate::simple_display! {
    FailCode {
        AccessDenied => "access_denied",
        BudgetExceeded => "budget_exceeded",
        RecoveryExhausted => "recovery_exhausted",
        VerificationFailed => "verification_failed",
        AiParseError => "ai_parse_error",
        PageUnavailable => "page_unavailable",
        JunctionOverrideLost => "junction_override_lost",
        AgentError => "agent_error",
        Timeout => "timeout",
        Internal => "internal",
    }
}

/// A structured failure: short code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCause {
    pub code: FailCode,
    pub message: String,
}

impl FailCause {
    pub fn new(code: FailCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn timeout() -> Self {
        Self::new(FailCode::Timeout, "session exceeded maximum lifetime")
    }

    pub fn budget_exceeded(remaining_micros: i64) -> Self {
        Self::new(
            FailCode::BudgetExceeded,
            format!("daily AI budget exhausted ({remaining_micros} µ$ remaining)"),
        )
    }
}

impl std::fmt::Display for FailCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
