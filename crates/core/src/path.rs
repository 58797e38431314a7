// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path tracker: junction bookkeeping across a session's mapped paths.
//!
//! A junction is a form input whose value changes which other inputs
//! appear. The tracker records every junction seen, which options were
//! tested, and which completed paths chose what; the path evaluator
//! reads this to decide whether another path is worth running.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::ResultId;

/// Identifier of a junction, derived from the junction name so the same
/// field maps to the same id across paths and regenerations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JunctionId(pub String);

impl JunctionId {
    pub fn from_name(name: &str) -> Self {
        Self(format!("jnc-{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of branching input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JunctionKind {
    #[default]
    Dropdown,
    Radio,
    CheckboxGroup,
}

crate::simple_display! {
    JunctionKind {
        Dropdown => "dropdown",
        Radio => "radio",
        CheckboxGroup => "checkbox_group",
    }
}

/// Confirmation status of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JunctionStatus {
    /// Just discovered, not tested yet.
    #[default]
    Unknown,
    /// Tested but no option revealed fields yet, and untested options remain.
    Uncertain,
    /// At least one option revealed new fields.
    Confirmed,
    /// Enough options tested with no field change; treat as an ordinary field.
    NotAJunction,
}

crate::simple_display! {
    JunctionStatus {
        Unknown => "unknown",
        Uncertain => "uncertain",
        Confirmed => "confirmed",
        NotAJunction => "not_a_junction",
    }
}

/// One option of a junction. `revealed_fields` is `None` until tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionOption {
    pub name: String,
    #[serde(default)]
    pub tested: bool,
    #[serde(default)]
    pub revealed_fields: Option<bool>,
}

impl JunctionOption {
    pub fn untested(name: impl Into<String>) -> Self {
        Self { name: name.into(), tested: false, revealed_fields: None }
    }
}

/// A branching input and everything observed about it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Junction {
    pub id: JunctionId,
    pub selector: String,
    pub kind: JunctionKind,
    pub step_index: u32,
    /// Options in DOM order; insertion order drives next-option choice.
    #[serde(default)]
    pub options: IndexMap<String, JunctionOption>,
    #[serde(default)]
    pub status: JunctionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_junction_id: Option<JunctionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_option: Option<String>,
}

impl Junction {
    pub fn new(id: JunctionId, selector: impl Into<String>, kind: JunctionKind, step_index: u32) -> Self {
        Self {
            id,
            selector: selector.into(),
            kind,
            step_index,
            options: IndexMap::new(),
            status: JunctionStatus::Unknown,
            parent_junction_id: None,
            parent_option: None,
        }
    }

    pub fn untested_options(&self) -> Vec<&str> {
        self.options
            .values()
            .filter(|o| !o.tested)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn tested_count(&self) -> usize {
        self.options.values().filter(|o| o.tested).count()
    }

    pub fn has_confirmed_reveal(&self) -> bool {
        self.options.values().any(|o| o.revealed_fields == Some(true))
    }

    pub fn all_tested_no_reveal(&self) -> bool {
        !self.options.is_empty()
            && self
                .options
                .values()
                .all(|o| o.tested && o.revealed_fields == Some(false))
    }
}

/// One junction choice within a completed path, in step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionStep {
    pub step_index: u32,
    pub junction_id: JunctionId,
    pub junction_name: String,
    pub option: String,
    pub selector: String,
}

/// A path that ran to commit: which option every junction got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPath {
    pub path_number: u32,
    #[serde(default)]
    pub junction_choices: IndexMap<JunctionId, String>,
    #[serde(default)]
    pub junction_steps: Vec<JunctionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<ResultId>,
}

/// Per-session junction discovery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTracker {
    #[serde(default)]
    pub junctions: IndexMap<JunctionId, Junction>,
    #[serde(default)]
    pub completed: Vec<CompletedPath>,
    pub current_path: u32,
}

impl Default for PathTracker {
    fn default() -> Self {
        Self { junctions: IndexMap::new(), completed: Vec::new(), current_path: 1 }
    }
}

impl PathTracker {
    /// Record a completed path and advance the path counter.
    pub fn complete_path(
        &mut self,
        junction_choices: IndexMap<JunctionId, String>,
        junction_steps: Vec<JunctionStep>,
        result_id: Option<ResultId>,
    ) -> u32 {
        let path_number = self.current_path;
        self.completed.push(CompletedPath {
            path_number,
            junction_choices,
            junction_steps,
            result_id,
        });
        self.current_path += 1;
        path_number
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Junction> {
        self.junctions
            .values()
            .filter(|j| j.status == JunctionStatus::Confirmed)
    }

    pub fn uncertain(&self) -> impl Iterator<Item = &Junction> {
        self.junctions
            .values()
            .filter(|j| j.status == JunctionStatus::Uncertain)
    }
}

/// Tunables for path exploration. Configuration, not contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Hard cap on paths per session.
    pub max_paths: u32,
    /// A field with more options than this is never tracked as a junction.
    pub max_options_for_junction: usize,
    /// Per-junction cap on options actually tested.
    pub max_options_to_test: usize,
    /// Option count above which the no-reveal heuristic kicks in.
    pub large_dropdown_threshold: usize,
    /// Tested-no-reveal count that marks a large dropdown not-a-junction.
    pub heuristic_tests_before_skip: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_paths: 7,
            max_options_for_junction: 8,
            max_options_to_test: 4,
            large_dropdown_threshold: 10,
            heuristic_tests_before_skip: 3,
        }
    }
}

/// Outcome of a path evaluation: either "done" or the next combination
/// of junction options to force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDecision {
    pub all_paths_complete: bool,
    pub next_path_number: u32,
    /// Selector → option to force on the next path.
    #[serde(default)]
    pub junction_instructions: IndexMap<String, String>,
    pub total_paths_needed: u32,
    pub reason: String,
}

impl PathDecision {
    pub fn done(tracker: &PathTracker, reason: impl Into<String>) -> Self {
        Self {
            all_paths_complete: true,
            next_path_number: tracker.current_path,
            junction_instructions: IndexMap::new(),
            total_paths_needed: tracker.completed.len() as u32,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
