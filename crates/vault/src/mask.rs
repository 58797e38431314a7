// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Display-safe renderings of stored secrets.

use serde::{Deserialize, Serialize};

/// What kind of secret a value is; drives masking and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Username,
    Password,
    ApiKey,
    TotpSeed,
}

fl_core::simple_display! {
    SecretKind {
        Username => "username",
        Password => "password",
        ApiKey => "api_key",
        TotpSeed => "totp_seed",
    }
}

/// Render a secret for display: enough to recognize, never enough to use.
pub fn mask(value: &str, kind: SecretKind) -> String {
    if value.is_empty() {
        return String::new();
    }
    match kind {
        SecretKind::Username => {
            let prefix: String = value.chars().take(2).collect();
            format!("{prefix}***")
        }
        SecretKind::Password | SecretKind::TotpSeed => "********".to_string(),
        SecretKind::ApiKey => {
            if value.len() <= 12 {
                return "********".to_string();
            }
            let head: String = value.chars().take(8).collect();
            let tail: String = value
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{head}...{tail}")
        }
    }
}

#[cfg(test)]
#[path = "mask_tests.rs"]
mod tests;
