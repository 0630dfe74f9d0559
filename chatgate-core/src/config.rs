// File: chatgate-core/src/config.rs
//! JSON governance configuration: prefix, starting balances, quotas, per-platform
//! sending limits and the command table.

use std::collections::HashMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::info;

use chatgate_common::models::{CommandDescriptor, Platform, PermissionLevel};
use crate::Error;
use crate::services::cooldown_governor::{QuotaSettings, MAX_COOLDOWN_SECONDS, MAX_WINDOW_DAYS};
use crate::services::dispatcher::DEFAULT_COMMAND_PREFIX;
use crate::services::message_sender::PlatformLimits;

fn default_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    #[serde(default)]
    pub starting_coins: i64,
    #[serde(default)]
    pub starting_karma: i64,
    #[serde(default)]
    pub quota: QuotaSettings,
    #[serde(default)]
    pub platforms: HashMap<Platform, PlatformLimits>,
    #[serde(default)]
    pub commands: Vec<CommandDescriptor>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            starting_coins: 0,
            starting_karma: 0,
            quota: QuotaSettings::default(),
            platforms: HashMap::new(),
            commands: Vec::new(),
        }
    }
}

impl GovernanceConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let de = &mut serde_json::Deserializer::from_str(json);
        let config: GovernanceConfig = serde_path_to_error::deserialize(de)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json_str(&raw)?;
        info!(
            "Loaded {} command(s) from {}",
            config.commands.len(),
            path.display()
        );
        Ok(config)
    }

    /// Structural checks only. Unknown permission strings are allowed here and
    /// deny at dispatch time.
    pub fn validate(&self) -> Result<(), Error> {
        if self.command_prefix.trim().is_empty() {
            return Err(Error::Config("command_prefix must not be empty".into()));
        }
        if self.command_prefix.chars().any(char::is_whitespace) {
            return Err(Error::Config("command_prefix must not contain whitespace".into()));
        }
        if self.quota.window_days == 0 {
            return Err(Error::Config("quota.window_days must be at least 1".into()));
        }
        if self.quota.window_days > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "quota.window_days must be at most {} (got {})",
                MAX_WINDOW_DAYS, self.quota.window_days
            )));
        }
        for (platform, limits) in &self.platforms {
            if limits.max_message_length < 16 {
                return Err(Error::Config(format!(
                    "platforms.{}.max_message_length is too small ({})",
                    platform, limits.max_message_length
                )));
            }
            if limits.max_send_attempts == 0 {
                return Err(Error::Config(format!(
                    "platforms.{}.max_send_attempts must be at least 1",
                    platform
                )));
            }
        }
        for (idx, cmd) in self.commands.iter().enumerate() {
            if cmd.name.trim().is_empty() {
                return Err(Error::Config(format!("commands[{}] has an empty name", idx)));
            }
            if cmd.cooldown_seconds > MAX_COOLDOWN_SECONDS {
                return Err(Error::Config(format!(
                    "commands[{}].cooldown_seconds must be at most {} (got {})",
                    idx, MAX_COOLDOWN_SECONDS, cmd.cooldown_seconds
                )));
            }
        }
        Ok(())
    }

    /// Commands whose permission string does not name a known level.
    pub fn unrecognized_permissions(&self) -> Vec<&CommandDescriptor> {
        self.commands
            .iter()
            .filter(|c| c.permission.parse::<PermissionLevel>().is_err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_common::models::EventType;
    use tokio_test::{assert_err, assert_ok};

    const SAMPLE: &str = r#"{
        "command_prefix": "!",
        "starting_coins": 100,
        "starting_karma": 5,
        "quota": { "window_days": 1, "capacities": { "good": 3, "bad": 2 } },
        "platforms": { "twitch": { "max_message_length": 450 } },
        "commands": [
            { "name": "weather", "alias": "w", "cooldown_seconds": 5, "handler": "reply",
              "response": "Sunny for {user}" },
            { "name": "hug", "event_type": "good", "handler": "reply", "response": "hug!" },
            { "name": "ban", "permission": "moderator", "handler": "reply", "response": "ok",
              "enabled": false }
        ]
    }"#;

    #[test]
    fn parses_full_config() {
        let config = GovernanceConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.starting_coins, 100);
        assert_eq!(config.quota.capacity_for(EventType::Good), Some(3));
        assert_eq!(config.quota.capacity_for(EventType::Neutral), None);
        assert_eq!(config.commands.len(), 3);
        assert_eq!(config.commands[0].alias.as_deref(), Some("w"));
        assert_eq!(config.commands[1].permission, "everyone");
        assert!(config.commands[1].enabled);
        assert!(!config.commands[2].enabled);

        let twitch = config.platforms[&Platform::Twitch];
        assert_eq!(twitch.max_message_length, 450);
        assert_eq!(twitch.max_send_attempts, 3);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let config = GovernanceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, GovernanceConfig::default());
        assert_eq!(config.command_prefix, "!");
    }

    #[test]
    fn error_names_the_offending_path() {
        let err = GovernanceConfig::from_json_str(
            r#"{ "commands": [ { "name": "x", "cooldown_seconds": "soon" } ] }"#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("commands[0].cooldown_seconds"), "got: {}", text);
    }

    #[test]
    fn rejects_bad_prefix_and_window() {
        assert_err!(GovernanceConfig::from_json_str(r#"{ "command_prefix": " " }"#));
        assert_err!(GovernanceConfig::from_json_str(r#"{ "quota": { "window_days": 0 } }"#));
        assert_ok!(GovernanceConfig::from_json_str(r#"{ "command_prefix": "?!" }"#));
    }

    #[test]
    fn rejects_out_of_range_window_and_cooldown() {
        assert_err!(GovernanceConfig::from_json_str(
            r#"{ "quota": { "window_days": 4000000000 } }"#
        ));
        assert_ok!(GovernanceConfig::from_json_str(r#"{ "quota": { "window_days": 36500 } }"#));

        let err = GovernanceConfig::from_json_str(
            r#"{ "commands": [ { "name": "ok", "cooldown_seconds": 3600 },
                               { "name": "x", "cooldown_seconds": 9223372036854775807 } ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("commands[1].cooldown_seconds"), "got: {}", err);
    }

    #[test]
    fn lists_unrecognized_permissions() {
        let config = GovernanceConfig::from_json_str(
            r#"{ "commands": [ { "name": "a", "permission": "superadmin" }, { "name": "b" } ] }"#,
        )
        .unwrap();
        let odd = config.unrecognized_permissions();
        assert_eq!(odd.len(), 1);
        assert_eq!(odd[0].name, "a");
    }
}
