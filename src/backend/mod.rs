//! Hosted Backend Clients
//!
//! Everything the application consumes from the hosting platform lives
//! behind the trait seams in this module:
//!
//! - [`identity::IdentityStore`]: auth service (sessions, user admin)
//! - [`table::TableStore`]: relational store (`profiles`, `audit_logs`)
//! - [`storage::BlobStore`]: object storage (avatars)
//!
//! The concrete `Http*` implementations speak the platform's REST surface
//! over a shared `reqwest` client with an explicit timeout. The traits are
//! object-safe so services hold `Arc<dyn ...>` and tests substitute the
//! in-memory stores below.

pub mod identity;
pub mod storage;
pub mod table;
pub mod types;

mod http;

pub use identity::{HttpIdentityStore, IdentityStore};
pub use storage::{BlobStore, HttpBlobStore};
pub use table::{HttpTableStore, TableStore};
pub use types::{merge_user_records, Identity, Profile, Role, UserRecord};

/// In-memory backend stores for tests.
#[cfg(test)]
pub(crate) mod memory {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use super::types::Identity;
    use crate::error::BackendError;

    /// Build a minimal identity record for tests.
    pub fn identity(id: &str, email: Option<&str>) -> Identity {
        Identity {
            id: id.to_string(),
            email: email.map(|e| e.to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_sign_in_at: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    fn backend_down() -> BackendError {
        BackendError::Transport("simulated backend failure".to_string())
    }

    /// In-memory identity store
    #[derive(Default)]
    pub struct MemoryIdentityStore {
        pub users: RwLock<Vec<Identity>>,
        /// access token -> user id
        pub sessions: RwLock<HashMap<String, String>>,
        /// ids passed to delete_user, in call order
        pub deleted: RwLock<Vec<String>>,
        /// (id, metadata) passed to update_user_metadata, in call order
        pub metadata_updates: RwLock<Vec<(String, serde_json::Value)>>,
        /// Fail the next lookup(s) by id
        pub fail_lookup: AtomicBool,
        /// Fail metadata mirror writes
        pub fail_metadata: AtomicBool,
    }

    impl MemoryIdentityStore {
        pub fn with_users(users: Vec<Identity>) -> Arc<Self> {
            let store = Self::default();
            *store.users.try_write().unwrap() = users;
            Arc::new(store)
        }

        pub async fn add_session(&self, token: &str, user_id: &str) {
            self.sessions
                .write()
                .await
                .insert(token.to_string(), user_id.to_string());
        }
    }

    #[async_trait]
    impl super::IdentityStore for MemoryIdentityStore {
        async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
            let sessions = self.sessions.read().await;
            let Some(user_id) = sessions.get(access_token) else {
                return Ok(None);
            };
            let users = self.users.read().await;
            Ok(users.iter().find(|u| &u.id == user_id).cloned())
        }

        async fn list_users(&self) -> Result<Vec<Identity>, BackendError> {
            Ok(self.users.read().await.clone())
        }

        async fn user_by_id(&self, id: &str) -> Result<Option<Identity>, BackendError> {
            if self.fail_lookup.load(Ordering::SeqCst) {
                return Err(backend_down());
            }
            let users = self.users.read().await;
            Ok(users.iter().find(|u| u.id == id).cloned())
        }

        async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
            let mut users = self.users.write().await;
            users.retain(|u| u.id != id);
            self.deleted.write().await.push(id.to_string());
            Ok(())
        }

        async fn update_user_metadata(
            &self,
            id: &str,
            metadata: serde_json::Value,
        ) -> Result<(), BackendError> {
            if self.fail_metadata.load(Ordering::SeqCst) {
                return Err(backend_down());
            }
            self.metadata_updates
                .write()
                .await
                .push((id.to_string(), metadata));
            Ok(())
        }
    }

    /// In-memory table store, insertion-ordered per table
    #[derive(Default)]
    pub struct MemoryTableStore {
        pub tables: RwLock<HashMap<String, Vec<serde_json::Value>>>,
        /// Fail insert calls (audit write failure simulation)
        pub fail_inserts: AtomicBool,
        /// Fail upsert calls (primary mutation failure simulation)
        pub fail_upserts: AtomicBool,
    }

    impl MemoryTableStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Seed a row without going through the trait.
        pub async fn seed(&self, table: &str, row: serde_json::Value) {
            self.tables
                .write()
                .await
                .entry(table.to_string())
                .or_default()
                .push(row);
        }

        pub async fn rows(&self, table: &str) -> Vec<serde_json::Value> {
            self.tables
                .read()
                .await
                .get(table)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn row_id(row: &serde_json::Value) -> Option<&str> {
        row.get("id").and_then(|v| v.as_str())
    }

    #[async_trait]
    impl super::TableStore for MemoryTableStore {
        async fn select_by_id(
            &self,
            table: &str,
            id: &str,
        ) -> Result<Option<serde_json::Value>, BackendError> {
            let tables = self.tables.read().await;
            Ok(tables
                .get(table)
                .and_then(|rows| rows.iter().find(|r| row_id(r) == Some(id)).cloned()))
        }

        async fn select_all(&self, table: &str) -> Result<Vec<serde_json::Value>, BackendError> {
            Ok(self.rows(table).await)
        }

        async fn select_recent(
            &self,
            table: &str,
            _order_col: &str,
            limit: usize,
        ) -> Result<Vec<serde_json::Value>, BackendError> {
            // Insertion order stands in for the order column.
            let rows = self.rows(table).await;
            Ok(rows.into_iter().rev().take(limit).collect())
        }

        async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(backend_down());
            }
            self.seed(table, row).await;
            Ok(())
        }

        async fn upsert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(backend_down());
            }
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            let id = row_id(&row).map(|s| s.to_string());
            let position = rows
                .iter()
                .position(|r| id.is_some() && row_id(r) == id.as_deref());
            match position {
                Some(i) => {
                    // Merge-duplicates resolution: new columns win, columns
                    // absent from the payload keep their stored value.
                    if let (Some(existing_map), Some(new_map)) =
                        (rows[i].as_object_mut(), row.as_object())
                    {
                        for (k, v) in new_map {
                            existing_map.insert(k.clone(), v.clone());
                        }
                    } else {
                        rows[i] = row;
                    }
                }
                None => rows.push(row),
            }
            Ok(())
        }
    }

    /// In-memory blob store
    #[derive(Default)]
    pub struct MemoryBlobStore {
        pub objects: RwLock<HashMap<String, Bytes>>,
    }

    #[async_trait]
    impl super::BlobStore for MemoryBlobStore {
        async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, BackendError> {
            self.objects
                .write()
                .await
                .insert(path.to_string(), bytes);
            Ok(path.to_string())
        }

        async fn download(&self, path: &str) -> Result<Bytes, BackendError> {
            let objects = self.objects.read().await;
            objects.get(path).cloned().ok_or(BackendError::Http {
                status: 404,
                message: "object not found".to_string(),
            })
        }

        fn public_url(&self, path: &str) -> String {
            format!("memory://avatars/{}", path)
        }
    }
}
