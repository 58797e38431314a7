// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path form mapping specs.

use crate::prelude::*;

use fl_core::Phase;

/// A form route with no junctions and three fields maps in
/// one path, commits one result row, and completes.
#[tokio::test]
async fn happy_form_mapping_single_path() {
    let world = World::new().await;

    world.ai.push_json(steps_response(serde_json::json!([
        {"step_number": 1, "action": "fill", "selector": "#name",
         "value": "Jo Doe", "description": "fill name"},
        {"step_number": 2, "action": "fill", "selector": "#email",
         "value": "jo@example.com", "description": "fill email"},
        {"step_number": 3, "action": "fill", "selector": "#phone",
         "value": "555-0100", "description": "fill phone"},
    ])));
    world.ai.push_json(clean_page_verdict(&["name", "email", "phone"]));

    let session_id = world.start_session().await;
    let agent = happy_agent(|_, _| false);
    world.run_to_completion(&session_id, &*agent).await;

    let record = world.session(&session_id).await;
    assert_eq!(record.phase, Phase::Completed);
    assert_eq!(record.executed.len(), 3);
    assert_eq!(record.tracker.completed.len(), 1);

    // Exactly one durable row, keyed path 1, carrying the steps.
    let row = world
        .intake
        .repos()
        .results
        .get(ROUTE, 1)
        .await
        .unwrap()
        .expect("result row for path 1");
    assert_eq!(row.steps.len(), 3);
    assert_eq!(row.verified_fields, vec!["name", "email", "phone"]);
    assert_eq!(
        world
            .intake
            .repos()
            .results
            .count_for_route(ROUTE)
            .await
            .unwrap(),
        1
    );

    // The durable session row rolled up.
    let status = world
        .intake
        .repos()
        .sessions
        .status(&session_id)
        .await
        .unwrap();
    assert_eq!(status.as_deref(), Some("completed"));

    // Two model calls: one step generation, one page verification.
    assert_eq!(world.ai.requests().len(), 2);
}

/// The session version grows monotonically across the whole run.
#[tokio::test]
async fn session_version_is_monotone_end_to_end() {
    let world = World::new().await;
    world.ai.push_json(steps_response(serde_json::json!([
        {"step_number": 1, "action": "fill", "selector": "#name",
         "value": "x", "description": "fill name"},
    ])));
    world.ai.push_json(clean_page_verdict(&["name"]));

    let session_id = world.start_session().await;
    let agent = happy_agent(|_, _| false);

    let mut last_version = world.session(&session_id).await.version;
    for _ in 0..50 {
        world.drain_workers().await;
        let record = world.session(&session_id).await;
        assert!(record.version >= last_version, "version went backwards");
        last_version = record.version;
        if record.is_terminal() {
            break;
        }
        world.agent_turn(&*agent).await;
    }
    assert!(world.session(&session_id).await.is_terminal());
}
