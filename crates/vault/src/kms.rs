// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KMS client abstraction.

use async_trait::async_trait;

use fl_core::TenantId;

use crate::VaultError;

const CONTEXT_KEY: &str = "tenant_id";

/// Envelope encryption with a tenant-bound context.
#[async_trait]
pub trait KmsClient: Send + Sync + 'static {
    async fn encrypt(&self, plaintext: &str, tenant_id: TenantId)
        -> Result<Vec<u8>, VaultError>;

    async fn decrypt(&self, blob: &[u8], tenant_id: TenantId) -> Result<String, VaultError>;
}

/// AWS KMS client.
pub struct AwsKms {
    client: aws_sdk_kms::Client,
    key_id: Option<String>,
}

impl AwsKms {
    pub async fn from_env(key_id: Option<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self { client: aws_sdk_kms::Client::new(&config), key_id }
    }

    pub fn new(client: aws_sdk_kms::Client, key_id: Option<String>) -> Self {
        Self { client, key_id }
    }
}

#[async_trait]
impl KmsClient for AwsKms {
    async fn encrypt(
        &self,
        plaintext: &str,
        tenant_id: TenantId,
    ) -> Result<Vec<u8>, VaultError> {
        let key_id = self.key_id.as_ref().ok_or(VaultError::KeyNotConfigured)?;
        let output = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(aws_sdk_kms::primitives::Blob::new(plaintext.as_bytes()))
            .encryption_context(CONTEXT_KEY, tenant_id.to_string())
            .send()
            .await
            .map_err(|e| VaultError::Kms(e.to_string()))?;
        let blob = output
            .ciphertext_blob
            .ok_or_else(|| VaultError::Kms("empty ciphertext from KMS".into()))?;
        Ok(blob.into_inner())
    }

    async fn decrypt(&self, blob: &[u8], tenant_id: TenantId) -> Result<String, VaultError> {
        let output = self
            .client
            .decrypt()
            .ciphertext_blob(aws_sdk_kms::primitives::Blob::new(blob))
            .encryption_context(CONTEXT_KEY, tenant_id.to_string())
            .send()
            .await
            .map_err(|e| {
                // KMS signals a wrong encryption context as an invalid
                // ciphertext; surface it as the tenant-mismatch case.
                let service = e.into_service_error();
                if service.is_invalid_ciphertext_exception() {
                    VaultError::ContextMismatch(tenant_id.0)
                } else {
                    VaultError::Kms(service.to_string())
                }
            })?;
        let plaintext = output
            .plaintext
            .ok_or_else(|| VaultError::Kms("empty plaintext from KMS".into()))?;
        String::from_utf8(plaintext.into_inner())
            .map_err(|_| VaultError::Kms("plaintext is not UTF-8".into()))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Deterministic KMS fake: the "ciphertext" embeds the tenant id
    //! and refuses to decrypt for any other tenant, mirroring the
    //! encryption-context behavior of the real service.

    use super::*;

    pub struct FakeKms {
        pub configured: bool,
    }

    impl Default for FakeKms {
        fn default() -> Self {
            Self { configured: true }
        }
    }

    impl FakeKms {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unconfigured() -> Self {
            Self { configured: false }
        }
    }

    #[async_trait]
    impl KmsClient for FakeKms {
        async fn encrypt(
            &self,
            plaintext: &str,
            tenant_id: TenantId,
        ) -> Result<Vec<u8>, VaultError> {
            if !self.configured {
                return Err(VaultError::KeyNotConfigured);
            }
            Ok(format!("fake-kms:{}:{}", tenant_id.0, plaintext).into_bytes())
        }

        async fn decrypt(&self, blob: &[u8], tenant_id: TenantId) -> Result<String, VaultError> {
            let raw = String::from_utf8(blob.to_vec())
                .map_err(|_| VaultError::Kms("bad fake blob".into()))?;
            let rest = raw
                .strip_prefix("fake-kms:")
                .ok_or_else(|| VaultError::Kms("bad fake blob".into()))?;
            let (tenant, plaintext) = rest
                .split_once(':')
                .ok_or_else(|| VaultError::Kms("bad fake blob".into()))?;
            if tenant != tenant_id.0.to_string() {
                return Err(VaultError::ContextMismatch(tenant_id.0));
            }
            Ok(plaintext.to_string())
        }
    }
}
