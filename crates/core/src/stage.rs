// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stages: the smallest executable unit consumed by the agent.

use serde::{Deserialize, Serialize};

/// Browser action an agent can perform for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Fill,
    Click,
    Select,
    Check,
    Uncheck,
    Hover,
    Scroll,
    Wait,
    AcceptAlert,
    DismissAlert,
    WaitDomReady,
    VerifyClickables,
    VerifyLoginPage,
    Verify,
}

impl StepAction {
    /// Alert actions fail soft: a missing alert means there was nothing
    /// to dismiss, and the session advances silently.
    pub fn is_alert(self) -> bool {
        matches!(self, StepAction::AcceptAlert | StepAction::DismissAlert)
    }

    /// A failing `verify` is a test-assertion failure, not a step error.
    pub fn is_assertion(self) -> bool {
        matches!(self, StepAction::Verify)
    }

    /// Actions that can act as a junction (change which fields appear).
    pub fn can_branch(self) -> bool {
        matches!(self, StepAction::Select | StepAction::Check | StepAction::Click)
    }
}

crate::simple_display! {
    StepAction {
        Fill => "fill",
        Click => "click",
        Select => "select",
        Check => "check",
        Uncheck => "uncheck",
        Hover => "hover",
        Scroll => "scroll",
        Wait => "wait",
        AcceptAlert => "accept_alert",
        DismissAlert => "dismiss_alert",
        WaitDomReady => "wait_dom_ready",
        VerifyClickables => "verify_clickables",
        VerifyLoginPage => "verify_login_page",
        Verify => "verify",
    }
}

/// One executable step.
///
/// Step generation marks branching inputs with `is_junction` and the
/// option inventory; execution fills the chosen option in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub step_number: u32,
    pub action: StepAction,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_xpath: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_junction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_info: Option<JunctionInfo>,
}

impl Stage {
    pub fn new(step_number: u32, action: StepAction, selector: impl Into<String>) -> Self {
        Self {
            step_number,
            action,
            selector: selector.into(),
            value: None,
            description: String::new(),
            full_xpath: None,
            is_junction: false,
            junction_info: None,
        }
    }

    crate::setters! {
        into {
            description: String,
        }
        option {
            value: String,
            full_xpath: String,
        }
    }

    /// Tag this stage as a junction with its option inventory.
    pub fn junction(mut self, info: JunctionInfo) -> Self {
        self.is_junction = true;
        self.junction_info = Some(info);
        self
    }
}

/// Junction metadata carried on a step so the path tracker and the
/// durable result can reconstruct the branch structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionInfo {
    pub junction_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_option: Option<String>,
    #[serde(default)]
    pub all_options: Vec<String>,
    #[serde(default)]
    pub junction_type: crate::path::JunctionKind,
}

impl JunctionInfo {
    pub fn new(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            junction_name: name.into(),
            chosen_option: None,
            all_options: options,
            junction_type: crate::path::JunctionKind::Dropdown,
        }
    }
}

/// A stage after execution, with the observed field-change signal the
/// path evaluator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedStep {
    #[serde(flatten)]
    pub stage: Stage,
    #[serde(default)]
    pub fields_changed: bool,
}

impl ExecutedStep {
    pub fn plain(stage: Stage) -> Self {
        Self { stage, fields_changed: false }
    }

    pub fn is_junction(&self) -> bool {
        self.stage.is_junction
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
