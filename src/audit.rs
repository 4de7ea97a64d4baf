//! Audit Log Writer
//!
//! Appends one immutable `audit_logs` row per successful privileged
//! mutation. Writes are best-effort by design: they happen strictly after
//! the primary mutation, are never retried, and their failures go to the
//! operator log instead of the caller. A crash between mutation and log
//! write therefore leaves an applied-but-unlogged mutation; that gap is
//! accepted, not corrected.
//!
//! If no acting identity is available the write is skipped silently;
//! logging must never block or fail the mutation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{Identity, TableStore};
use crate::error::BackendError;

/// Table the writer appends to
const AUDIT_TABLE: &str = "audit_logs";

/// Privileged mutation kinds that get audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// A user's role was changed
    #[serde(rename = "UPDATE_ROLE")]
    UpdateRole,

    /// A user account was deleted
    #[serde(rename = "DELETE_USER")]
    DeleteUser,
}

impl AuditAction {
    /// Wire representation stored in the `action` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UpdateRole => "UPDATE_ROLE",
            AuditAction::DeleteUser => "DELETE_USER",
        }
    }
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub action: AuditAction,
    pub actor_id: String,
    #[serde(default)]
    pub actor_email: Option<String>,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(default)]
    pub target_user_email: Option<String>,
    /// Action-specific key/value details (`old_role`, `new_role`,
    /// `username`, `full_name`)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Best-effort writer for the audit trail
#[derive(Clone)]
pub struct AuditWriter {
    tables: Arc<dyn TableStore>,
}

impl AuditWriter {
    pub fn new(tables: Arc<dyn TableStore>) -> Self {
        Self { tables }
    }

    /// Append an entry for a completed mutation. Never fails: a missing
    /// actor skips the write, a backend error is logged and swallowed.
    pub async fn record(
        &self,
        actor: Option<&Identity>,
        action: AuditAction,
        target_user_id: Option<&str>,
        target_user_email: Option<&str>,
        metadata: serde_json::Value,
    ) {
        let Some(actor) = actor else {
            debug!(action = action.as_str(), "no acting identity, skipping audit write");
            return;
        };

        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            action,
            actor_id: actor.id.clone(),
            actor_email: actor.email.clone(),
            target_user_id: target_user_id.map(|s| s.to_string()),
            target_user_email: target_user_email.map(|s| s.to_string()),
            metadata,
        };

        let row = match serde_json::to_value(&entry) {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "failed to serialize audit entry");
                return;
            }
        };

        if let Err(err) = self.tables.insert(AUDIT_TABLE, row).await {
            warn!(
                error = %err,
                action = action.as_str(),
                target = target_user_id.unwrap_or("-"),
                "audit log write failed"
            );
        }
    }

    /// Newest entries first, for the admin audit trail view.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, BackendError> {
        let rows = self
            .tables
            .select_recent(AUDIT_TABLE, "created_at", limit)
            .await?;

        // Rows that don't decode are dropped rather than failing the whole
        // listing; the table may contain entries from older schema versions.
        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable audit row");
                    None
                }
            })
            .collect())
    }
}
