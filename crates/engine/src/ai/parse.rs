// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed parsing of model output.
//!
//! The model is asked for JSON but regularly wraps it in prose or a
//! fenced code block; extraction is forgiving, the schema check is not.
//! A parse failure here is the `AiParseError` soft failure the
//! orchestrator answers with exactly one regeneration.

use serde::de::DeserializeOwned;

use fl_core::{FieldVerdict, PathDecision, RecoveryDecision, Stage};

/// Pull the first JSON object or array out of the model's text.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(fenced) = trimmed.split("```").nth(1) {
        let inner = fenced.strip_prefix("json").unwrap_or(fenced).trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }
    let start = trimmed.find(['{', '['])?;
    let open = trimmed.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let end = trimmed.bytes().rposition(|b| b == close)?;
    if end <= start {
        return None;
    }
    trimmed.get(start..=end)
}

/// Parse model text into `T`, tolerating prose around the JSON.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    let json = extract_json(text).ok_or_else(|| "no JSON found in model output".to_string())?;
    serde_json::from_str(json).map_err(|e| e.to_string())
}

/// An ordered step list (analyze / regenerate output).
pub fn parse_steps(text: &str) -> Result<Vec<Stage>, String> {
    #[derive(serde::Deserialize)]
    struct StepsEnvelope {
        steps: Vec<Stage>,
    }
    // Accept either a bare array or {"steps": [...]}.
    parse_model_json::<Vec<Stage>>(text)
        .or_else(|_| parse_model_json::<StepsEnvelope>(text).map(|e| e.steps))
}

/// A recovery classification.
pub fn parse_recovery(text: &str) -> Result<RecoveryDecision, String> {
    parse_model_json(text)
}

/// Result-page verification verdicts.
#[derive(Debug, serde::Deserialize)]
pub struct PageVerdictPayload {
    pub ready: bool,
    #[serde(default)]
    pub failures: Vec<FieldVerdict>,
}

pub fn parse_page_verdict(text: &str) -> Result<PageVerdictPayload, String> {
    parse_model_json(text)
}

/// Verify-step visual check.
#[derive(Debug, serde::Deserialize)]
pub struct StepVisualPayload {
    pub passed: bool,
    #[serde(default)]
    pub blocking_issue: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

pub fn parse_step_visual(text: &str) -> Result<StepVisualPayload, String> {
    parse_model_json(text)
}

/// UI visual sweep: newly observed defects, empty string when clean.
#[derive(Debug, serde::Deserialize)]
pub struct UiVisualPayload {
    #[serde(default)]
    pub new_issues: String,
}

pub fn parse_ui_visual(text: &str) -> Result<UiVisualPayload, String> {
    parse_model_json(text)
}

/// AI-assisted path evaluation (used when the heuristic evaluator is
/// asked to defer).
pub fn parse_path_decision(text: &str) -> Result<PathDecision, String> {
    parse_model_json(text)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
