// File: chatgate-common/src/models/command.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Fairness classification shared by many commands; quotas are counted per event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Good,
    Bad,
    Neutral,
    #[default]
    None,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Good => write!(f, "good"),
            EventType::Bad => write!(f, "bad"),
            EventType::Neutral => write!(f, "neutral"),
            EventType::None => write!(f, "none"),
        }
    }
}

impl FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(EventType::Good),
            "bad" => Ok(EventType::Bad),
            "neutral" => Ok(EventType::Neutral),
            "none" | "" => Ok(EventType::None),
            other => Err(format!("Unknown event type: {}", other)),
        }
    }
}

/// Role hierarchy, lowest to highest. Declaration order is the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    Everyone,
    Subscriber,
    Vip,
    Moderator,
    Broadcaster,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Everyone => write!(f, "everyone"),
            PermissionLevel::Subscriber => write!(f, "subscriber"),
            PermissionLevel::Vip => write!(f, "vip"),
            PermissionLevel::Moderator => write!(f, "moderator"),
            PermissionLevel::Broadcaster => write!(f, "broadcaster"),
        }
    }
}

impl FromStr for PermissionLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "everyone" => Ok(PermissionLevel::Everyone),
            "subscriber" => Ok(PermissionLevel::Subscriber),
            "vip" => Ok(PermissionLevel::Vip),
            "moderator" => Ok(PermissionLevel::Moderator),
            "broadcaster" => Ok(PermissionLevel::Broadcaster),
            other => Err(format!("Unknown permission level: {}", other)),
        }
    }
}

fn default_permission() -> String {
    "everyone".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Configuration-owned metadata describing one chat command (e.g. `!raid`).
///
/// The required permission is kept as the raw configured string so that a typo in
/// configuration is seen by the permission evaluator (which denies) rather than
/// rejected or silently defaulted at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_permission")]
    pub permission: String,
    #[serde(default)]
    pub cooldown_seconds: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub event_type: EventType,
    /// Key into the handler registry. Empty means "same as name".
    #[serde(default)]
    pub handler: String,
    /// Static response text for the `reply` handler.
    #[serde(default)]
    pub response: Option<String>,
}

impl CommandDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            permission: default_permission(),
            cooldown_seconds: 0,
            enabled: true,
            event_type: EventType::None,
            handler: String::new(),
            response: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permission = permission.to_string();
        self
    }

    pub fn with_cooldown(mut self, seconds: i64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_handler(mut self, handler: &str) -> Self {
        self.handler = handler.to_string();
        self
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn handler_key(&self) -> String {
        if self.handler.is_empty() {
            self.name.to_ascii_lowercase()
        } else {
            self.handler.to_ascii_lowercase()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_levels_are_ordered() {
        assert!(PermissionLevel::Everyone < PermissionLevel::Subscriber);
        assert!(PermissionLevel::Subscriber < PermissionLevel::Vip);
        assert!(PermissionLevel::Vip < PermissionLevel::Moderator);
        assert!(PermissionLevel::Moderator < PermissionLevel::Broadcaster);
    }

    #[test]
    fn descriptor_defaults_from_json() {
        let d: CommandDescriptor = serde_json::from_str(r#"{"name":"Weather"}"#).unwrap();
        assert_eq!(d.permission, "everyone");
        assert!(d.enabled);
        assert_eq!(d.event_type, EventType::None);
        assert_eq!(d.handler_key(), "weather");
    }
}
