// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log sanitization: scrubs secrets from every record before emission.
//!
//! Runs unconditionally, including in per-tenant debug mode, where AI
//! prompts and responses are logged verbatim and are the most likely
//! place for a pasted credential to surface.

use once_cell::sync::Lazy;
use regex::Regex;

struct ScrubRule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: Lazy<Vec<ScrubRule>> = Lazy::new(|| {
    [
        // Anthropic API keys
        (r"(?i)sk-ant-api\d{2}-[A-Za-z0-9\-_]{20,}", "sk-ant-***REDACTED***"),
        // Generic api_key=... assignments
        (
            r#"(?i)api[_-]?key["\s:=]+["']?[A-Za-z0-9\-_]{20,}["']?"#,
            "api_key=***REDACTED***",
        ),
        // JSON-quoted passwords
        (r#""password"\s*:\s*"[^"]{3,}""#, r#""password": "***REDACTED***""#),
        // Bare password assignments
        (
            r#"(?i)password["\s:=]+["']?[^"'\s,}\]]{3,}["']?"#,
            "password=***REDACTED***",
        ),
        // AWS access key ids
        (r"AKIA[A-Z0-9]{16}", "AKIA***REDACTED***"),
        // AWS secret access keys
        (
            r#"(?i)aws[_-]?secret[_-]?access[_-]?key["\s:=]+["']?[A-Za-z0-9/+=]{20,}["']?"#,
            "aws_secret=***REDACTED***",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| {
        Regex::new(pattern)
            .ok()
            .map(|pattern| ScrubRule { pattern, replacement })
    })
    .collect()
});

/// Replace credential-shaped substrings with redaction markers.
pub fn sanitize(text: &str) -> String {
    let mut result = text.to_string();
    for rule in RULES.iter() {
        if rule.pattern.is_match(&result) {
            result = rule
                .pattern
                .replace_all(&result, rule.replacement)
                .into_owned();
        }
    }
    result
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
