// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use thiserror::Error;

use crate::ai::AiError;
use crate::gate::GateError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] fl_store::StoreError),

    #[error(transparent)]
    Vault(#[from] fl_vault::VaultError),

    #[error(transparent)]
    ObjStore(#[from] fl_objstore::ObjStoreError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("session not found: {0}")]
    SessionMissing(String),

    #[error("invalid task args for {task}: {detail}")]
    BadTaskArgs { task: String, detail: String },
}
