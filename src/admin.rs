//! Admin Mutation Service
//!
//! Privileged operations on user accounts: role changes and deletions,
//! plus the merged user listing and audit trail the admin surface renders.
//!
//! Every operation starts with a capability check against the caller's
//! profile row; a non-admin caller gets `Unauthorized` before any side
//! effect. Audit entries are written strictly after a mutation succeeds,
//! through the best-effort [`AuditWriter`]. The profile table is the
//! source of truth for roles; the mirror into the identity record's
//! metadata exists for consistency and is allowed to fail.

use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditWriter};
use crate::backend::{
    merge_user_records, Identity, IdentityStore, Profile, Role, TableStore, UserRecord,
};
use crate::error::{BackendError, OpsError};

/// Table holding the lazily-created per-user profile rows
const PROFILE_TABLE: &str = "profiles";

/// Admin mutation service
#[derive(Clone)]
pub struct AdminService {
    identity: Arc<dyn IdentityStore>,
    tables: Arc<dyn TableStore>,
    audit: AuditWriter,
}

impl AdminService {
    pub fn new(identity: Arc<dyn IdentityStore>, tables: Arc<dyn TableStore>) -> Self {
        let audit = AuditWriter::new(tables.clone());
        Self {
            identity,
            tables,
            audit,
        }
    }

    /// Fetch and decode a profile row. `None` when the row doesn't exist.
    async fn profile_of(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        match self.tables.select_by_id(PROFILE_TABLE, user_id).await? {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|err| BackendError::Decode(err.to_string())),
            None => Ok(None),
        }
    }

    /// Whether the actor holds the admin capability. Missing profile rows
    /// default to the `user` role, so they are never admins.
    pub async fn is_admin(&self, actor: &Identity) -> Result<bool, BackendError> {
        let role = self
            .profile_of(&actor.id)
            .await?
            .map(|p| p.effective_role())
            .unwrap_or_default();
        Ok(role == Role::Admin)
    }

    async fn require_admin(&self, actor: &Identity) -> Result<(), OpsError> {
        if self.is_admin(actor).await? {
            Ok(())
        } else {
            Err(OpsError::Unauthorized)
        }
    }

    /// Delete a user account. The identity deletion cascades into
    /// dependent rows (including the profile) on the platform side.
    ///
    /// The pre-deletion snapshot exists only to enrich the audit entry;
    /// if it cannot be fetched the deletion still proceeds and the entry
    /// carries null metadata fields.
    pub async fn delete_user(&self, actor: &Identity, user_id: &str) -> Result<(), OpsError> {
        self.require_admin(actor).await?;

        let snapshot = match self.profile_of(user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(error = %err, user_id, "pre-deletion profile snapshot failed");
                None
            }
        };
        let target = match self.identity.user_by_id(user_id).await {
            Ok(target) => target,
            Err(err) => {
                warn!(error = %err, user_id, "pre-deletion identity lookup failed");
                None
            }
        };

        self.identity.delete_user(user_id).await?;
        info!(user_id, actor = %actor.id, "deleted user account");

        let snapshot = snapshot.unwrap_or_default();
        self.audit
            .record(
                Some(actor),
                AuditAction::DeleteUser,
                Some(user_id),
                target.as_ref().and_then(|t| t.email.as_deref()),
                serde_json::json!({
                    "username": snapshot.username,
                    "full_name": snapshot.full_name,
                }),
            )
            .await;

        Ok(())
    }

    /// Change a user's role. Upserts the profile row (creating it when the
    /// user has never written a profile), then best-effort mirrors the
    /// role into the identity record's metadata.
    ///
    /// Reassigning the current role is a no-op in effect but still writes
    /// an audit entry with `old_role == new_role`.
    pub async fn update_user_role(
        &self,
        actor: &Identity,
        user_id: &str,
        new_role: Role,
    ) -> Result<(), OpsError> {
        self.require_admin(actor).await?;

        let previous = match self.profile_of(user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(error = %err, user_id, "previous role lookup failed, assuming defaults");
                None
            }
        };
        let old_role = previous
            .as_ref()
            .map(|p| p.effective_role())
            .unwrap_or_default();

        self.tables
            .upsert(
                PROFILE_TABLE,
                serde_json::json!({
                    "id": user_id,
                    "role": new_role,
                    "updated_at": chrono::Utc::now(),
                }),
            )
            .await?;
        info!(user_id, %old_role, %new_role, actor = %actor.id, "updated user role");

        // Consistency mirror only; the profile table stays authoritative.
        if let Err(err) = self
            .identity
            .update_user_metadata(user_id, serde_json::json!({ "role": new_role }))
            .await
        {
            warn!(error = %err, user_id, "failed to sync role to identity metadata");
        }

        let target_email = match self.identity.user_by_id(user_id).await {
            Ok(target) => target.and_then(|t| t.email),
            Err(_) => None,
        };
        let previous = previous.unwrap_or_default();
        self.audit
            .record(
                Some(actor),
                AuditAction::UpdateRole,
                Some(user_id),
                target_email.as_deref(),
                serde_json::json!({
                    "old_role": old_role,
                    "new_role": new_role,
                    "username": previous.username,
                    "full_name": previous.full_name,
                }),
            )
            .await;

        Ok(())
    }

    /// Merged identity + profile listing for the admin view, newest first.
    pub async fn list_users(&self, actor: &Identity) -> Result<Vec<UserRecord>, OpsError> {
        self.require_admin(actor).await?;

        let identities = self.identity.list_users().await?;
        let profiles = self
            .tables
            .select_all(PROFILE_TABLE)
            .await?
            .into_iter()
            // Undecodable rows degrade to defaults instead of failing the listing.
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        Ok(merge_user_records(identities, profiles))
    }

    /// Recent audit trail, admin-gated.
    pub async fn recent_audit(
        &self,
        actor: &Identity,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, OpsError> {
        self.require_admin(actor).await?;
        Ok(self.audit.recent(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{identity, MemoryIdentityStore, MemoryTableStore};
    use std::sync::atomic::Ordering;

    struct Fixture {
        identity: Arc<MemoryIdentityStore>,
        tables: Arc<MemoryTableStore>,
        service: AdminService,
        admin: Identity,
        member: Identity,
    }

    async fn fixture() -> Fixture {
        let admin = identity("admin-1", Some("admin@x.com"));
        let member = identity("u1", Some("a@x.com"));
        let ids = MemoryIdentityStore::with_users(vec![admin.clone(), member.clone()]);
        let tables = MemoryTableStore::new();
        tables
            .seed(
                "profiles",
                serde_json::json!({"id": "admin-1", "role": "admin", "username": "boss"}),
            )
            .await;

        let service = AdminService::new(ids.clone(), tables.clone());
        Fixture {
            identity: ids,
            tables,
            service,
            admin,
            member,
        }
    }

    #[tokio::test]
    async fn test_non_admin_cannot_mutate() {
        let f = fixture().await;

        let err = f
            .service
            .delete_user(&f.member, "admin-1")
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Unauthorized));

        let err = f
            .service
            .update_user_role(&f.member, "u1", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Unauthorized));

        // Zero side effects: nothing deleted, nothing upserted, no audit rows.
        assert!(f.identity.deleted.read().await.is_empty());
        assert!(f.tables.rows("audit_logs").await.is_empty());
        let profile = f
            .tables
            .select_by_id("profiles", "u1")
            .await
            .unwrap();
        assert!(profile.is_none());
    }

    #[tokio::test]
    async fn test_delete_user_writes_audit_with_snapshot() {
        let f = fixture().await;
        f.tables
            .seed(
                "profiles",
                serde_json::json!({"id": "u1", "username": "jo", "full_name": "Jo Doe"}),
            )
            .await;

        f.service.delete_user(&f.admin, "u1").await.unwrap();

        assert_eq!(f.identity.deleted.read().await.as_slice(), ["u1"]);
        let rows = f.tables.rows("audit_logs").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["action"], "DELETE_USER");
        assert_eq!(rows[0]["target_user_email"], "a@x.com");
        assert_eq!(rows[0]["metadata"]["username"], "jo");
        assert_eq!(rows[0]["metadata"]["full_name"], "Jo Doe");
    }

    #[tokio::test]
    async fn test_delete_user_without_profile_logs_null_metadata() {
        let f = fixture().await;

        f.service.delete_user(&f.admin, "u1").await.unwrap();

        let rows = f.tables.rows("audit_logs").await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["metadata"]["username"].is_null());
        assert!(rows[0]["metadata"]["full_name"].is_null());
    }

    #[tokio::test]
    async fn test_delete_proceeds_when_snapshot_fetch_fails() {
        let f = fixture().await;
        f.identity.fail_lookup.store(true, Ordering::SeqCst);

        f.service.delete_user(&f.admin, "u1").await.unwrap();

        assert_eq!(f.identity.deleted.read().await.as_slice(), ["u1"]);
        let rows = f.tables.rows("audit_logs").await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["target_user_email"].is_null());
    }

    #[tokio::test]
    async fn test_update_role_upserts_missing_profile_row() {
        let f = fixture().await;

        f.service
            .update_user_role(&f.admin, "u1", Role::Admin)
            .await
            .unwrap();

        let profile = f
            .tables
            .select_by_id("profiles", "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile["role"], "admin");

        // Mirror reached the identity record too.
        let updates = f.identity.metadata_updates.read().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "u1");
        assert_eq!(updates[0].1["role"], "admin");
    }

    #[tokio::test]
    async fn test_role_flip_produces_ordered_audit_pairs() {
        let f = fixture().await;

        f.service
            .update_user_role(&f.admin, "u1", Role::Admin)
            .await
            .unwrap();
        f.service
            .update_user_role(&f.admin, "u1", Role::User)
            .await
            .unwrap();

        let rows = f.tables.rows("audit_logs").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["metadata"]["old_role"], "user");
        assert_eq!(rows[0]["metadata"]["new_role"], "admin");
        assert_eq!(rows[1]["metadata"]["old_role"], "admin");
        assert_eq!(rows[1]["metadata"]["new_role"], "user");
    }

    #[tokio::test]
    async fn test_noop_reassignment_still_audited() {
        let f = fixture().await;

        f.service
            .update_user_role(&f.admin, "u1", Role::User)
            .await
            .unwrap();

        let rows = f.tables.rows("audit_logs").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["metadata"]["old_role"], "user");
        assert_eq!(rows[0]["metadata"]["new_role"], "user");
    }

    #[tokio::test]
    async fn test_metadata_mirror_failure_does_not_fail_update() {
        let f = fixture().await;
        f.identity.fail_metadata.store(true, Ordering::SeqCst);

        f.service
            .update_user_role(&f.admin, "u1", Role::Admin)
            .await
            .unwrap();

        // Primary mutation and audit entry both landed.
        let profile = f
            .tables
            .select_by_id("profiles", "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile["role"], "admin");
        assert_eq!(f.tables.rows("audit_logs").await.len(), 1);
    }

    #[tokio::test]
    async fn test_primary_upsert_failure_propagates_without_audit() {
        let f = fixture().await;
        f.tables.fail_upserts.store(true, Ordering::SeqCst);

        let err = f
            .service
            .update_user_role(&f.admin, "u1", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Backend(_)));
        assert!(f.tables.rows("audit_logs").await.is_empty());
    }

    #[tokio::test]
    async fn test_list_users_merges_and_gates() {
        let f = fixture().await;

        let records = f.service.list_users(&f.admin).await.unwrap();
        assert_eq!(records.len(), 2);
        let u1 = records.iter().find(|r| r.id == "u1").unwrap();
        assert_eq!(u1.role, Role::User);
        assert!(u1.username.is_none());
        let boss = records.iter().find(|r| r.id == "admin-1").unwrap();
        assert_eq!(boss.role, Role::Admin);
        assert_eq!(boss.username.as_deref(), Some("boss"));

        assert!(matches!(
            f.service.list_users(&f.member).await,
            Err(OpsError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_recent_audit_gated_and_ordered() {
        let f = fixture().await;
        f.service
            .update_user_role(&f.admin, "u1", Role::Admin)
            .await
            .unwrap();
        f.service.delete_user(&f.admin, "u1").await.unwrap();

        let entries = f.service.recent_audit(&f.admin, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::DeleteUser);

        assert!(matches!(
            f.service.recent_audit(&f.member, 10).await,
            Err(OpsError::Unauthorized)
        ));
    }
}
