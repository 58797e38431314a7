// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3 gateway: presigned PUT/GET, worker-side fetch, prefix cleanup.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::ServerSideEncryption;

use crate::key::ObjectKey;
use crate::ObjStoreError;

/// One upload slot requested by an agent.
#[derive(Debug, Clone)]
pub struct PresignRequest {
    pub key: ObjectKey,
    pub content_type: String,
}

/// A short-lived URL plus the key it addresses.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub key: String,
    pub url: String,
    pub expires_in_secs: u64,
}

/// Gateway over one bucket.
#[derive(Clone)]
pub struct ObjectGateway {
    client: aws_sdk_s3::Client,
    bucket: String,
    default_ttl: Duration,
    /// Tenant-supplied KMS key for SSE-KMS uploads (BYOK tenants).
    byok_kms_key_id: Option<String>,
}

impl ObjectGateway {
    pub async fn from_env(bucket: String, default_ttl_secs: u64) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, default_ttl_secs)
    }

    pub fn new(client: aws_sdk_s3::Client, bucket: String, default_ttl_secs: u64) -> Self {
        Self {
            client,
            bucket,
            default_ttl: Duration::from_secs(default_ttl_secs),
            byok_kms_key_id: None,
        }
    }

    /// Bind uploads to a tenant-supplied KMS key.
    pub fn with_byok_kms_key(mut self, key_id: Option<String>) -> Self {
        self.byok_kms_key_id = key_id;
        self
    }

    fn presign_config(&self, ttl: Option<Duration>) -> Result<PresigningConfig, ObjStoreError> {
        PresigningConfig::expires_in(ttl.unwrap_or(self.default_ttl))
            .map_err(|e| ObjStoreError::Presign(e.to_string()))
    }

    /// Presigned PUT for one object.
    pub async fn presign_put(
        &self,
        request: &PresignRequest,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, ObjStoreError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(request.key.render())
            .content_type(&request.content_type);
        if let Some(kms_key) = &self.byok_kms_key_id {
            put = put
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(kms_key);
        }
        let presigned = put
            .presigned(self.presign_config(Some(ttl))?)
            .await
            .map_err(|e| ObjStoreError::Presign(e.to_string()))?;
        Ok(PresignedUrl {
            key: request.key.render(),
            url: presigned.uri().to_string(),
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Presigned PUTs for a batch of objects.
    pub async fn presign_put_batch(
        &self,
        requests: &[PresignRequest],
        ttl: Option<Duration>,
    ) -> Result<Vec<PresignedUrl>, ObjStoreError> {
        let mut urls = Vec::with_capacity(requests.len());
        for request in requests {
            urls.push(self.presign_put(request, ttl).await?);
        }
        Ok(urls)
    }

    /// Presigned GET for one object.
    pub async fn presign_get(
        &self,
        key: &ObjectKey,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, ObjStoreError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.render())
            .presigned(self.presign_config(Some(ttl))?)
            .await
            .map_err(|e| ObjStoreError::Presign(e.to_string()))?;
        Ok(PresignedUrl {
            key: key.render(),
            url: presigned.uri().to_string(),
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Fetch an object's bytes (background workers pulling agent
    /// uploads; never called from agent request handlers).
    pub async fn fetch(&self, key: &ObjectKey) -> Result<Vec<u8>, ObjStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.render())
            .send()
            .await
            .map_err(|e| ObjStoreError::S3(e.to_string()))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| ObjStoreError::S3(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    pub async fn delete(&self, key: &ObjectKey) -> Result<(), ObjStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.render())
            .send()
            .await
            .map_err(|e| ObjStoreError::S3(e.to_string()))?;
        Ok(())
    }

    /// Delete everything under a prefix; returns the object count.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, ObjStoreError> {
        let mut deleted = 0;
        let mut continuation: Option<String> = None;
        loop {
            let mut list = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                list = list.continuation_token(token);
            }
            let output = list
                .send()
                .await
                .map_err(|e| ObjStoreError::S3(e.to_string()))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| ObjStoreError::S3(e.to_string()))?;
                deleted += 1;
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        tracing::info!(prefix, deleted, "deleted object prefix");
        Ok(deleted)
    }
}
