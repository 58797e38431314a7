// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret store: KMS round trips with a short-TTL plaintext cache.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use fl_core::{NetworkId, TenantId};
use fl_store::FastStore;

use crate::kms::KmsClient;
use crate::mask::SecretKind;
use crate::VaultError;

/// Tenant-bound secret store.
///
/// Decryption failure is fatal to the calling operation; there is no
/// fallback key and no silent downgrade.
#[derive(Clone)]
pub struct SecretStore {
    kms: Arc<dyn KmsClient>,
    cache: Arc<dyn FastStore>,
    cache_ttl_secs: u64,
}

impl SecretStore {
    pub fn new(kms: Arc<dyn KmsClient>, cache: Arc<dyn FastStore>, cache_ttl_secs: u64) -> Self {
        Self { kms, cache, cache_ttl_secs }
    }

    /// Encrypt a plaintext for a tenant. Returns base64 ciphertext.
    pub async fn encrypt(
        &self,
        plaintext: &str,
        tenant_id: TenantId,
    ) -> Result<String, VaultError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let blob = self.kms.encrypt(plaintext, tenant_id).await?;
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a base64 ciphertext for a tenant. No cache.
    pub async fn decrypt(
        &self,
        ciphertext: &str,
        tenant_id: TenantId,
    ) -> Result<String, VaultError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let blob = BASE64
            .decode(ciphertext)
            .map_err(|_| VaultError::BadCiphertext)?;
        self.kms.decrypt(&blob, tenant_id).await
    }

    /// Decrypt with the fast-store plaintext cache in front.
    ///
    /// Only the hot kinds (model API key, network credentials) are
    /// worth caching; a cache miss or a cache outage falls through to
    /// KMS rather than failing the operation.
    pub async fn decrypt_cached(
        &self,
        ciphertext: &str,
        tenant_id: TenantId,
        kind: SecretKind,
        network_id: Option<NetworkId>,
    ) -> Result<String, VaultError> {
        let key = cache_key(tenant_id, kind, network_id);
        match self.cache.cached_secret(&key).await {
            Ok(Some(plaintext)) => return Ok(plaintext),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "secret cache read failed");
            }
        }

        let plaintext = self.decrypt(ciphertext, tenant_id).await?;
        if let Err(err) = self
            .cache
            .cache_secret(&key, &plaintext, self.cache_ttl_secs)
            .await
        {
            tracing::warn!(key = %key, error = %err, "secret cache write failed");
        }
        Ok(plaintext)
    }

    /// Drop the cached plaintext after a mutation.
    pub async fn invalidate(
        &self,
        tenant_id: TenantId,
        kind: SecretKind,
        network_id: Option<NetworkId>,
    ) -> Result<(), VaultError> {
        self.cache
            .invalidate_secret(&cache_key(tenant_id, kind, network_id))
            .await?;
        Ok(())
    }
}

fn cache_key(tenant_id: TenantId, kind: SecretKind, network_id: Option<NetworkId>) -> String {
    match network_id {
        Some(network) => format!("secret:{tenant_id}:{kind}:{network}"),
        None => format!("secret:{tenant_id}:{kind}"),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
