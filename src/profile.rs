//! Profile Service
//!
//! Self-service profile reads and writes for the signed-in user, plus the
//! avatar flows over blob storage. Profile rows are created lazily: the
//! first write upserts the row, and reads of a missing row return
//! defaults rather than an error.

use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::backend::{BlobStore, Profile, TableStore};
use crate::error::{BackendError, OpsError};

const PROFILE_TABLE: &str = "profiles";

/// Editable profile fields, as submitted by the settings form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    /// Storage path of a newly uploaded avatar, if any
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Empty strings become null so the store's constraints treat cleared
/// fields as absent values.
fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Per-user profile operations
#[derive(Clone)]
pub struct ProfileService {
    tables: Arc<dyn TableStore>,
    blobs: Arc<dyn BlobStore>,
}

impl ProfileService {
    pub fn new(tables: Arc<dyn TableStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { tables, blobs }
    }

    /// Fetch a user's profile; a missing row yields defaults.
    pub async fn get(&self, user_id: &str) -> Result<Profile, OpsError> {
        match self.tables.select_by_id(PROFILE_TABLE, user_id).await? {
            Some(row) => serde_json::from_value(row)
                .map_err(|err| OpsError::Backend(BackendError::Decode(err.to_string()))),
            None => Ok(Profile {
                id: user_id.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Upsert the user's profile with the submitted fields.
    pub async fn update(&self, user_id: &str, update: ProfileUpdate) -> Result<(), OpsError> {
        let row = serde_json::json!({
            "id": user_id,
            "username": normalize(update.username),
            "full_name": normalize(update.full_name),
            "avatar_url": normalize(update.avatar_url),
            "updated_at": chrono::Utc::now(),
        });

        self.tables.upsert(PROFILE_TABLE, row).await?;
        info!(user_id, "profile updated");
        Ok(())
    }

    /// Upload a new avatar image and return its storage path.
    ///
    /// Paths carry a random nonce so re-uploads never collide with a
    /// cached object: `{user_id}-{nonce}.{ext}`.
    pub async fn upload_avatar(
        &self,
        user_id: &str,
        extension: &str,
        bytes: Bytes,
    ) -> Result<String, OpsError> {
        let nonce: u32 = rand::random();
        let path = format!("{}-{}.{}", user_id, nonce, extension);
        let path = self.blobs.upload(&path, bytes).await?;
        info!(user_id, path, "avatar uploaded");
        Ok(path)
    }

    /// Download an avatar's bytes by storage path. A missing object is
    /// `NotFound`, not a backend failure.
    pub async fn download_avatar(&self, path: &str) -> Result<Bytes, OpsError> {
        match self.blobs.download(path).await {
            Ok(bytes) => Ok(bytes),
            Err(BackendError::Http { status: 404, .. }) => Err(OpsError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Public URL for an avatar path.
    pub fn avatar_url(&self, path: &str) -> String {
        self.blobs.public_url(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBlobStore, MemoryTableStore};
    use crate::backend::Role;

    fn service(tables: Arc<MemoryTableStore>) -> ProfileService {
        ProfileService::new(tables, Arc::new(MemoryBlobStore::default()))
    }

    #[tokio::test]
    async fn test_missing_profile_yields_defaults() {
        let tables = MemoryTableStore::new();
        let profile = service(tables).get("u1").await.unwrap();

        assert_eq!(profile.id, "u1");
        assert!(profile.username.is_none());
        assert!(profile.full_name.is_none());
        assert_eq!(profile.effective_role(), Role::User);
    }

    #[tokio::test]
    async fn test_update_creates_row_lazily() {
        let tables = MemoryTableStore::new();
        let service = service(tables.clone());

        service
            .update(
                "u1",
                ProfileUpdate {
                    username: Some("jo".to_string()),
                    full_name: Some("Jo Doe".to_string()),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();

        let profile = service.get("u1").await.unwrap();
        assert_eq!(profile.username.as_deref(), Some("jo"));
        assert_eq!(profile.full_name.as_deref(), Some("Jo Doe"));
    }

    #[tokio::test]
    async fn test_empty_strings_become_null() {
        let tables = MemoryTableStore::new();
        let service = service(tables.clone());

        service
            .update(
                "u1",
                ProfileUpdate {
                    username: Some(String::new()),
                    full_name: Some("Jo".to_string()),
                    avatar_url: Some(String::new()),
                },
            )
            .await
            .unwrap();

        let row = tables
            .select_by_id("profiles", "u1")
            .await
            .unwrap()
            .unwrap();
        assert!(row["username"].is_null());
        assert!(row["avatar_url"].is_null());
        assert_eq!(row["full_name"], "Jo");
    }

    #[tokio::test]
    async fn test_avatar_round_trip() {
        let tables = MemoryTableStore::new();
        let service = service(tables);
        let bytes = Bytes::from_static(b"png-bytes");

        let path = service
            .upload_avatar("u1", "png", bytes.clone())
            .await
            .unwrap();
        assert!(path.starts_with("u1-"));
        assert!(path.ends_with(".png"));

        let downloaded = service.download_avatar(&path).await.unwrap();
        assert_eq!(downloaded, bytes);
    }

    #[tokio::test]
    async fn test_missing_avatar_is_not_found() {
        let tables = MemoryTableStore::new();
        let service = service(tables);

        let err = service.download_avatar("nope.png").await.unwrap_err();
        assert!(matches!(err, OpsError::NotFound));
    }

    #[tokio::test]
    async fn test_avatar_paths_do_not_collide() {
        let tables = MemoryTableStore::new();
        let service = service(tables);

        let a = service
            .upload_avatar("u1", "png", Bytes::from_static(b"a"))
            .await
            .unwrap();
        let b = service
            .upload_avatar("u1", "png", Bytes::from_static(b"b"))
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
