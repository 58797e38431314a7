// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result recorder: commits one path's steps as a durable row.

use fl_core::{ResultId, SessionId};
use fl_store::{MappingResultRow, Repos};

use crate::error::EngineError;
use crate::task_args::SaveArgs;

/// Write the durable result row for one completed path and patch any
/// healed stages back onto the route.
///
/// The row is keyed `(form_route_id, path_number)`; re-running the
/// task replaces the row rather than duplicating it. The route patch
/// is equally idempotent, so healing is written as soon as a path
/// carrying it commits.
pub async fn save_result(
    repos: &Repos,
    session_id: &SessionId,
    args: SaveArgs,
    now_ms: u64,
) -> Result<ResultId, EngineError> {
    let Some(form_route_id) = args.form_route_id else {
        return Err(EngineError::BadTaskArgs {
            task: "save_mapping_result".into(),
            detail: "session has no form route".into(),
        });
    };

    let result_id = repos
        .results
        .upsert(&MappingResultRow {
            form_route_id,
            path_number: args.path_number,
            steps: args.steps,
            verified_fields: args.verified_fields,
            created_at_ms: now_ms,
        })
        .await?;

    if args.healed_login_stages.is_some() || args.healed_nav_stages.is_some() {
        repos
            .routes
            .patch_stages(
                form_route_id,
                args.healed_login_stages.as_deref(),
                args.healed_nav_stages.as_deref(),
            )
            .await?;
        tracing::info!(
            session_id = %session_id,
            form_route_id = %form_route_id,
            "healed stages written back to route"
        );
    }

    tracing::info!(
        session_id = %session_id,
        form_route_id = %form_route_id,
        path_number = args.path_number,
        result_id = %result_id,
        "mapping result committed"
    );
    Ok(result_id)
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
