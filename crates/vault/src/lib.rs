// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-vault: tenant-bound envelope encryption for stored credentials.
//!
//! Every plaintext (model API key, browser password, TOTP seed) is
//! encrypted through KMS with an encryption context carrying the tenant
//! id, so a stolen ciphertext cannot be decrypted for another tenant.
//! Decrypted values are cached for a short TTL in the fast store and
//! explicitly invalidated on mutation.

mod kms;
mod mask;
mod store;

pub use kms::{AwsKms, KmsClient};
pub use mask::{mask, SecretKind};
pub use store::SecretStore;

#[cfg(any(test, feature = "test-support"))]
pub use kms::fake::FakeKms;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// KMS key id is unset; encryption is refused, never downgraded.
    #[error("KMS key not configured")]
    KeyNotConfigured,

    /// KMS rejected the ciphertext for this tenant's context.
    #[error("encryption context mismatch for tenant {0}")]
    ContextMismatch(i64),

    #[error("ciphertext is not valid base64")]
    BadCiphertext,

    #[error("KMS error: {0}")]
    Kms(String),

    #[error(transparent)]
    Cache(#[from] fl_store::StoreError),
}
