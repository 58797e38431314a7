// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error types.

use thiserror::Error;

/// Errors from the fast or relational store.
///
/// Store outages fail loudly: callers surface 5xx or abort the task,
/// they never retry in place or silently queue to nowhere.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fast store unavailable: {0}")]
    FastUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A compare-and-swap write lost to a concurrent intake.
    #[error("version conflict on session {0}")]
    VersionConflict(String),

    #[error("row not found: {0}")]
    RowMissing(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::FastUnavailable(err.to_string())
    }
}
