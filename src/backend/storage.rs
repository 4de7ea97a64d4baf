//! Blob Storage
//!
//! Seam over the platform's object storage, scoped to a single bucket.
//! Used by the profile service for avatar images.

use async_trait::async_trait;
use bytes::Bytes;

use super::http::expect_ok;
use crate::error::BackendError;

/// Blob storage contract, scoped to one bucket
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload an object, returning its path within the bucket.
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, BackendError>;

    /// Download an object's bytes.
    async fn download(&self, path: &str) -> Result<Bytes, BackendError>;

    /// Public URL for an object. No network call; the bucket must be
    /// configured public for the URL to resolve.
    fn public_url(&self, path: &str) -> String;
}

/// Blob store over the platform's storage REST API
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    anon_key: String,
    service_role_key: String,
}

impl HttpBlobStore {
    /// Create a store for one bucket under a project base URL.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        anon_key: impl Into<String>,
        service_role_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            anon_key: anon_key.into(),
            service_role_key: service_role_key.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.object_url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
            .body(bytes)
            .send()
            .await?;
        expect_ok(response).await?;
        Ok(path.to_string())
    }

    async fn download(&self, path: &str) -> Result<Bytes, BackendError> {
        let response = self
            .client
            .get(self.object_url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;
        let response = expect_ok(response).await?;
        Ok(response.bytes().await?)
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}
