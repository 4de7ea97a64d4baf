//! Realtime Channel Events
//!
//! Payload types delivered over the shared presence channel: presence
//! events (`sync` is authoritative full state, `join`/`leave` are
//! advisory) and row-level change events for the `profiles` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Heartbeat payload a client announces into the presence channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub user_id: String,
    pub online_at: DateTime<Utc>,
}

/// Row image carried by a profile change event
///
/// Old-row images are only delivered when the backend is configured to
/// publish full row images; with the default changed-columns setting the
/// `old` side of updates arrives empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileChange {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    #[serde(default)]
    pub role: Option<String>,
}

impl ProfileChange {
    /// Display name fallback chain: full name, then email, then a
    /// shortened id.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.full_name.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        if let Some(email) = self.email.as_deref().filter(|s| !s.is_empty()) {
            return email.to_string();
        }
        let short: String = self.id.chars().take(5).collect();
        format!("Member ({})", short)
    }
}

/// Everything the channel can deliver to a subscriber
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Full presence state; the only authoritative source of the online set
    PresenceSync(HashMap<String, Vec<PresenceMeta>>),

    /// Incremental arrival. Advisory only: may be reordered relative to
    /// `sync` or missed across a reconnect.
    PresenceJoin { key: String },

    /// Incremental departure. Advisory only, same caveats as join.
    PresenceLeave { key: String },

    /// A profile row was inserted
    RowInserted { new: ProfileChange },

    /// A profile row was updated. `old` is present only when the backend
    /// delivers full old-row images.
    RowUpdated {
        old: Option<ProfileChange>,
        new: ProfileChange,
    },
}

/// User-facing notification derived from a change event
///
/// Delivery is at-most-once; duplicates and drops are acceptable. These
/// feed transient UI feedback, not a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new profile row appeared (fresh signup)
    MemberJoined { display_name: String },

    /// A profile's role changed
    RoleChanged {
        display_name: String,
        new_role: String,
    },

    /// Any other profile update
    ProfileUpdated { display_name: String },
}
