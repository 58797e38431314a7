// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed args for background task envelopes.
//!
//! The orchestrator serializes these into `WorkerEnvelope.args`; the
//! workers deserialize them back. Keeping both ends on one type makes
//! the envelope schema a compile-time fact.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use fl_core::{ExecutedStep, FormRouteId, PathConfig, PathTracker, SessionId, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeArgs {
    pub dom_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_inputs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_document: Option<String>,
    /// Selector → option to force on this path (junction seeding).
    #[serde(default)]
    pub junction_instructions: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerateArgs {
    pub dom_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    pub executed: Vec<ExecutedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverArgs {
    pub step: Stage,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_history: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiVisualArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    #[serde(default)]
    pub prior_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisualArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    pub executed: Vec<ExecutedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepVisualArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_key: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateArgs {
    pub tracker: PathTracker,
    pub config: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_route_id: Option<FormRouteId>,
    pub path_number: u32,
    pub steps: Vec<ExecutedStep>,
    #[serde(default)]
    pub verified_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healed_login_stages: Option<Vec<Stage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healed_nav_stages: Option<Vec<Stage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestLogArgs {
    pub session_id: SessionId,
    pub object_key: String,
}
