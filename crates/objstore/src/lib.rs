// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-objstore: presigned-URL gateway in front of object storage.
//!
//! Agents never hold long-term object-store credentials. Every upload
//! and download goes through a short-lived presigned URL, and every key
//! is tenant-prefixed and validated before any URL is issued.

mod gateway;
mod key;

pub use gateway::{ObjectGateway, PresignRequest, PresignedUrl};
pub use key::{ObjectKey, ObjectKind};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjStoreError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object store error: {0}")]
    S3(String),

    #[error("presigning error: {0}")]
    Presign(String),
}
