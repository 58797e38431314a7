// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Junction-path exploration specs.

use crate::prelude::*;

use fl_core::{JunctionId, JunctionStatus, Phase};

fn junction_steps() -> serde_json::Value {
    steps_response(serde_json::json!([
        {"step_number": 1, "action": "fill", "selector": "#name",
         "value": "Jo Doe", "description": "fill name"},
        {"step_number": 2, "action": "select", "selector": "#country",
         "value": "A", "description": "choose country",
         "is_junction": true,
         "junction_info": {"junction_name": "country",
                           "all_options": ["A", "B", "C"],
                           "junction_type": "dropdown"}},
    ]))
}

/// One dropdown with options {A, B, C}; A reveals field X,
/// B reveals field Y, C reveals nothing. Three paths commit, the
/// junction confirms, C records tested-no-reveal, and the total stays
/// under max_paths.
#[tokio::test]
async fn one_dropdown_junction_three_paths() {
    let world = World::new().await;

    // Path 1 generates steps once; each committed path verifies a page.
    world.ai.push_json(junction_steps());
    world.ai.push_json(clean_page_verdict(&["name", "country"]));
    world.ai.push_json(clean_page_verdict(&["name", "country"]));
    world.ai.push_json(clean_page_verdict(&["name", "country"]));

    let session_id = world.start_session().await;
    // A and B reveal option-specific fields; C reveals nothing.
    let agent = happy_agent(|selector, value| {
        selector == "#country" && matches!(value, Some("A") | Some("B"))
    });
    world.run_to_completion(&session_id, &*agent).await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Completed);
    assert_eq!(record.tracker.completed.len(), 3, "A-path, B-path, C-path");
    assert!(record.tracker.completed.len() as u32 <= record.config.path.max_paths);

    let junction = &record.tracker.junctions[&JunctionId::from_name("country")];
    assert_eq!(junction.status, JunctionStatus::Confirmed);
    assert_eq!(junction.options["A"].revealed_fields, Some(true));
    assert_eq!(junction.options["B"].revealed_fields, Some(true));
    assert_eq!(junction.options["C"].revealed_fields, Some(false));

    // One result row per path, junction choices embedded.
    for (path_number, expected_choice) in [(1, "A"), (2, "B"), (3, "C")] {
        let row = world
            .intake
            .repos()
            .results
            .get(ROUTE, path_number)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("result row for path {path_number}"));
        let junction_step = row
            .steps
            .iter()
            .find(|s| s.stage.is_junction)
            .expect("junction step in result");
        assert_eq!(
            junction_step
                .stage
                .junction_info
                .as_ref()
                .unwrap()
                .chosen_option
                .as_deref(),
            Some(expected_choice)
        );
        // The tracker's record for this path matches the row.
        let tracked = &record.tracker.completed[path_number as usize - 1];
        assert_eq!(
            tracked.junction_choices[&JunctionId::from_name("country")],
            expected_choice
        );
    }

    // Steps were generated once; replays reuse the mapped steps.
    let analyze_calls = world
        .ai
        .requests()
        .iter()
        .filter(|r| r.prompt.contains("map web forms"))
        .count();
    assert_eq!(analyze_calls, 1);
}

/// The per-junction option budget bounds testing even when options
/// remain.
#[tokio::test]
async fn junction_option_cap_is_honored() {
    let world = World::new().await;

    world.ai.push_json(steps_response(serde_json::json!([
        {"step_number": 1, "action": "select", "selector": "#plan",
         "value": "o1", "description": "choose plan",
         "is_junction": true,
         "junction_info": {"junction_name": "plan",
                           "all_options": ["o1", "o2", "o3", "o4", "o5", "o6"],
                           "junction_type": "dropdown"}},
    ])));
    for _ in 0..5 {
        world.ai.push_json(clean_page_verdict(&["plan"]));
    }

    let session_id = world.start_session().await;
    let agent = happy_agent(|selector, _| selector == "#plan");
    world.run_to_completion(&session_id, &*agent).await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Completed);

    let junction = &record.tracker.junctions[&JunctionId::from_name("plan")];
    let tested = junction.options.values().filter(|o| o.tested).count();
    assert!(
        tested <= record.config.path.max_options_to_test,
        "tested {tested} options, cap is {}",
        record.config.path.max_options_to_test
    );
}
