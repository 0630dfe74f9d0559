// File: chatgate-common/src/models/message.rs

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::models::platform::Platform;
use crate::models::viewer::ViewerRoles;

/// Canonical, platform-independent chat message. One per inbound event; discarded after
/// a single dispatch cycle.
///
/// Connectors build these through a normalizer, which guarantees `text` and `username`
/// are at worst empty strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub platform: Platform,
    /// Reply target on the platform (IRC channel, Discord channel id...). May be empty.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    /// Platform-scoped user id, when the platform provides one.
    #[serde(default)]
    pub platform_user_id: Option<String>,
    /// Role flags the platform reported for this message (badges etc.).
    /// `None` means the platform said nothing and the stored roles are left alone.
    #[serde(default)]
    pub roles: Option<ViewerRoles>,
    /// Opaque pass-through data (reward id, bit count...).
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl ChatMessage {
    pub fn new(platform: Platform, username: &str, text: &str) -> Self {
        Self {
            platform,
            channel: String::new(),
            text: text.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            platform_user_id: None,
            roles: None,
            extras: HashMap::new(),
        }
    }

    /// Identity key: the platform user id when present, else the lowercased username.
    pub fn identity_key(&self) -> String {
        match self.platform_user_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.username.to_lowercase(),
        }
    }

    /// Name to address the sender by in replies.
    pub fn reply_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn with_user_id(mut self, id: &str) -> Self {
        self.platform_user_id = Some(id.to_string());
        self
    }

    pub fn with_roles(mut self, roles: ViewerRoles) -> Self {
        self.roles = Some(roles);
        self
    }
}
