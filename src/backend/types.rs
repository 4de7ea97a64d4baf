//! Backend Record Types
//!
//! Row and record shapes shared across the backend seams: the identity
//! record owned by the auth service, the lazily-created profile row, and
//! the merged per-user view the admin surface renders.
//!
//! A profile row may not exist for a given identity (it is created on the
//! first profile write), so absence always decodes to defaults (`user`
//! role, null names), never to an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Identity record owned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier
    pub id: String,

    /// Primary email, absent for phone-only signups
    #[serde(default)]
    pub email: Option<String>,

    /// Account creation time
    pub created_at: DateTime<Utc>,

    /// Last successful sign-in, if any
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,

    /// Free-form metadata mirror (the profile table stays the source of truth)
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Application role stored on the profile row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member
    #[default]
    User,
    /// Administrator with access to privileged mutations
    Admin,
}

impl Role {
    /// Wire representation, matching the `profiles.role` column values.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Profile row from the `profiles` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the identity record
    pub id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    /// Storage object path of the avatar, not a URL
    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub role: Option<Role>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Effective role: missing rows and missing columns both mean `user`.
    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or_default()
    }
}

/// Merged identity + profile view for the admin user list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_sign_in: Option<DateTime<Utc>>,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub role: Role,
    pub avatar_url: Option<String>,
}

/// Merge identity records with their profile rows, joined on id.
///
/// Identities without a profile row get defaults (`role = user`, null
/// names). The result is ordered by creation time, newest first, which is
/// the order the admin view renders.
pub fn merge_user_records(identities: Vec<Identity>, profiles: Vec<Profile>) -> Vec<UserRecord> {
    let mut by_id: HashMap<String, Profile> =
        profiles.into_iter().map(|p| (p.id.clone(), p)).collect();

    let mut records: Vec<UserRecord> = identities
        .into_iter()
        .map(|identity| {
            let profile = by_id.remove(&identity.id).unwrap_or_default();
            UserRecord {
                id: identity.id,
                email: identity.email.unwrap_or_default(),
                created_at: identity.created_at,
                last_sign_in: identity.last_sign_in_at,
                role: profile.effective_role(),
                full_name: profile.full_name,
                username: profile.username,
                avatar_url: profile.avatar_url,
            }
        })
        .collect();

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}
