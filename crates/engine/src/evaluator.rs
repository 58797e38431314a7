// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path evaluator: decides whether more junction paths are worth
//! running and which option combination to force next.
//!
//! This is the piece that turns N junctions into roughly N+1 paths
//! instead of a combinatorial product: uncertain junctions are probed
//! one option at a time, confirmed junctions get their remaining
//! options, and oversized dropdowns are written off early.

use indexmap::IndexMap;

use fl_core::{
    ExecutedStep, Junction, JunctionId, JunctionOption, JunctionStatus, PathConfig, PathDecision,
    PathTracker,
};

/// Update junction bookkeeping from one executed junction step.
pub fn update_junction_from_step(
    tracker: &mut PathTracker,
    step: &ExecutedStep,
    config: &PathConfig,
) {
    if !step.is_junction() {
        return;
    }
    let Some(info) = &step.stage.junction_info else {
        return;
    };
    let junction_id = JunctionId::from_name(&info.junction_name);

    if !tracker.junctions.contains_key(&junction_id) {
        // Placeholder options (empty labels) are never real choices.
        let options: Vec<&String> = info
            .all_options
            .iter()
            .filter(|o| !o.trim().is_empty())
            .collect();
        if options.len() > config.max_options_for_junction {
            tracing::info!(
                junction = %junction_id,
                options = options.len(),
                "skipping junction with too many options"
            );
            return;
        }
        let mut junction = Junction::new(
            junction_id.clone(),
            step.stage.selector.clone(),
            info.junction_type,
            step.stage.step_number,
        );
        for option in options {
            junction
                .options
                .insert(option.clone(), JunctionOption::untested(option.clone()));
        }
        tracing::info!(
            junction = %junction_id,
            options = junction.options.len(),
            "new junction discovered"
        );
        tracker.junctions.insert(junction_id.clone(), junction);
    }

    let Some(junction) = tracker.junctions.get_mut(&junction_id) else {
        return;
    };
    let chosen = info
        .chosen_option
        .clone()
        .or_else(|| step.stage.value.clone());
    if let Some(chosen) = chosen {
        if let Some(option) = junction.options.get_mut(&chosen) {
            option.tested = true;
            option.revealed_fields = Some(step.fields_changed);
        }
    }

    refresh_status(junction, config);
}

fn refresh_status(junction: &mut Junction, config: &PathConfig) {
    if junction.has_confirmed_reveal() {
        junction.status = JunctionStatus::Confirmed;
        return;
    }

    // Large dropdowns: several tests with no reveal means it is a
    // plain field (country lists are not enumerated).
    let tested = junction.tested_count();
    if junction.options.len() > config.large_dropdown_threshold
        && tested >= config.heuristic_tests_before_skip
    {
        let all_no_reveal = junction
            .options
            .values()
            .filter(|o| o.tested)
            .all(|o| o.revealed_fields == Some(false));
        if all_no_reveal {
            junction.status = JunctionStatus::NotAJunction;
            return;
        }
    }

    if junction.all_tested_no_reveal() {
        junction.status = JunctionStatus::NotAJunction;
        return;
    }

    if junction.untested_options().is_empty() {
        junction.status = JunctionStatus::NotAJunction;
    } else {
        junction.status = JunctionStatus::Uncertain;
    }
}

/// Evaluate completed paths: done, or the next combination to force.
pub fn evaluate_paths(tracker: &mut PathTracker, config: &PathConfig) -> PathDecision {
    detect_nesting(tracker);

    let has_live_junctions = tracker
        .junctions
        .values()
        .any(|j| matches!(j.status, JunctionStatus::Confirmed | JunctionStatus::Uncertain));
    if !has_live_junctions {
        return PathDecision::done(
            tracker,
            "no junctions found or all confirmed as not-junctions",
        );
    }

    if tracker.completed.len() as u32 >= config.max_paths {
        return PathDecision {
            all_paths_complete: true,
            next_path_number: tracker.current_path,
            junction_instructions: IndexMap::new(),
            total_paths_needed: config.max_paths,
            reason: format!("maximum paths limit ({}) reached", config.max_paths),
        };
    }

    let instructions = next_combination(tracker, config);
    if instructions.is_empty() {
        return PathDecision::done(tracker, "all junction combinations have been tested");
    }

    let total = estimate_total_paths(tracker).min(config.max_paths);
    PathDecision {
        all_paths_complete: false,
        next_path_number: tracker.current_path,
        total_paths_needed: total,
        reason: format!("testing junction options: {instructions:?}"),
        junction_instructions: instructions,
    }
}

/// Pick the next untested option, uncertain junctions first (one at a
/// time), then confirmed junctions with their parent-chain overrides.
fn next_combination(tracker: &PathTracker, config: &PathConfig) -> IndexMap<String, String> {
    let mut instructions = IndexMap::new();

    for junction in tracker.uncertain() {
        if junction.tested_count() >= config.max_options_to_test {
            continue;
        }
        if let Some(option) = junction.untested_options().first() {
            instructions.insert(junction.selector.clone(), (*option).to_string());
            // Probe uncertain junctions one at a time.
            return instructions;
        }
    }

    for junction in tracker.confirmed() {
        if junction.tested_count() >= config.max_options_to_test {
            continue;
        }
        let Some(option) = junction.untested_options().first().map(|o| (*o).to_string())
        else {
            continue;
        };
        instructions.insert(junction.selector.clone(), option);

        // Walk the parent chain so the replay lands in the same context.
        let mut current = junction;
        let mut visited = Vec::new();
        while let (Some(parent_id), Some(parent_option)) =
            (&current.parent_junction_id, &current.parent_option)
        {
            if visited.contains(parent_id) {
                break;
            }
            visited.push(parent_id.clone());
            let Some(parent) = tracker.junctions.get(parent_id) else {
                break;
            };
            instructions.insert(parent.selector.clone(), parent_option.clone());
            current = parent;
        }
        break;
    }

    instructions
}

/// Rough upper bound on paths still worth running.
fn estimate_total_paths(tracker: &PathTracker) -> u32 {
    let mut total = 1u32;
    for junction in tracker.confirmed() {
        let revealing = junction
            .options
            .values()
            .filter(|o| o.revealed_fields == Some(true))
            .count() as u32;
        let untested = junction.untested_options().len() as u32;
        total += (revealing + untested).saturating_sub(1);
    }
    for junction in tracker.uncertain() {
        total += junction.untested_options().len() as u32;
    }
    total.max(1)
}

/// Detect nested junctions from completed paths: B is nested under A
/// when B only appears in a strict subset of A's paths and B's step
/// comes after A's in those paths.
fn detect_nesting(tracker: &mut PathTracker) {
    if tracker.completed.len() < 2 {
        return;
    }

    let mut membership: IndexMap<JunctionId, Vec<u32>> = IndexMap::new();
    for path in &tracker.completed {
        for junction_id in path.junction_choices.keys() {
            membership
                .entry(junction_id.clone())
                .or_default()
                .push(path.path_number);
        }
    }

    let mut assignments: Vec<(JunctionId, JunctionId, String)> = Vec::new();
    for (id_b, paths_b) in &membership {
        let Some(junction_b) = tracker.junctions.get(id_b) else {
            continue;
        };
        if junction_b.parent_junction_id.is_some() {
            continue;
        }

        'parents: for (id_a, paths_a) in &membership {
            if id_a == id_b || !tracker.junctions.contains_key(id_a) {
                continue;
            }
            let strict_subset = paths_b.len() < paths_a.len()
                && paths_b.iter().all(|p| paths_a.contains(p));
            if !strict_subset {
                continue;
            }

            for path in &tracker.completed {
                if !paths_b.contains(&path.path_number) {
                    continue;
                }
                let step_a = path.junction_steps.iter().find(|s| &s.junction_id == id_a);
                let step_b = path.junction_steps.iter().find(|s| &s.junction_id == id_b);
                if let (Some(step_a), Some(step_b)) = (step_a, step_b) {
                    if step_a.step_index < step_b.step_index {
                        tracing::info!(
                            child = %id_b,
                            parent = %id_a,
                            option = %step_a.option,
                            "detected nested junction"
                        );
                        assignments.push((id_b.clone(), id_a.clone(), step_a.option.clone()));
                        break 'parents;
                    }
                }
            }
        }
    }

    for (child, parent, option) in assignments {
        if let Some(junction) = tracker.junctions.get_mut(&child) {
            junction.parent_junction_id = Some(parent);
            junction.parent_option = Some(option);
        }
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
