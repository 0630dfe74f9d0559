// File: chatgate-common/src/models/viewer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::platform::Platform;

/// Role flags. Not mutually exclusive; `broadcaster` is just another flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerRoles {
    #[serde(default)]
    pub subscriber: bool,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub broadcaster: bool,
}

impl ViewerRoles {
    pub fn moderator() -> Self {
        Self { moderator: true, ..Self::default() }
    }

    pub fn subscriber() -> Self {
        Self { subscriber: true, ..Self::default() }
    }

    pub fn vip() -> Self {
        Self { vip: true, ..Self::default() }
    }

    pub fn broadcaster() -> Self {
        Self { broadcaster: true, ..Self::default() }
    }
}

/// Long-lived identity record for a chat participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewer {
    /// Platform user id, or lowercased username when the platform has none.
    pub identity_key: String,
    pub platform: Platform,
    pub username: String,
    pub roles: ViewerRoles,
    pub banned: bool,
    pub coins: i64,
    pub karma: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Viewer {
    pub fn new(
        identity_key: &str,
        platform: Platform,
        username: &str,
        coins: i64,
        karma: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_key: identity_key.to_string(),
            platform,
            username: username.to_string(),
            roles: ViewerRoles::default(),
            banned: false,
            coins,
            karma,
            created_at: now,
            last_seen: now,
        }
    }
}
