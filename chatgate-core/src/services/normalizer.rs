// File: chatgate-core/src/services/normalizer.rs
//! The contract connectors satisfy before handing a message to the dispatcher:
//! turn a platform event into a `ChatMessage`, never failing. Missing optional
//! fields become empty values.

use std::collections::HashMap;
use serde::Deserialize;
use chatgate_common::models::{ChatMessage, Platform, ViewerRoles};

pub trait Normalize {
    fn normalize(self) -> ChatMessage;
}

/// Loosely-typed event as most connectors receive it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawChatEvent {
    pub platform: Option<Platform>,
    pub channel: Option<String>,
    pub text: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
    pub roles: Option<ViewerRoles>,
    pub extras: HashMap<String, String>,
}

impl Normalize for RawChatEvent {
    fn normalize(self) -> ChatMessage {
        let username = self.username.unwrap_or_default();
        let display_name = self
            .display_name
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| username.clone());
        ChatMessage {
            platform: self.platform.unwrap_or(Platform::Console),
            channel: self.channel.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            username,
            display_name,
            platform_user_id: self.user_id.filter(|id| !id.is_empty()),
            roles: self.roles,
            extras: self.extras,
        }
    }
}

/// A Twitch IRC PRIVMSG with its IRCv3 tags already split into a map.
#[derive(Debug, Clone, Default)]
pub struct TwitchIrcEvent {
    pub tags: HashMap<String, String>,
    pub login: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
}

impl TwitchIrcEvent {
    /// Parses one raw IRC line such as
    /// `@badges=moderator/1;user-id=42 :nick!nick@nick.tmi.twitch.tv PRIVMSG #chan :!ping`.
    /// Returns `None` for anything that is not a PRIVMSG.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (tags, rest) = match line.strip_prefix('@') {
            Some(tagged) => {
                let (tags, rest) = tagged.split_once(' ')?;
                (parse_tags(tags), rest)
            }
            None => (HashMap::new(), line),
        };

        let rest = rest.strip_prefix(':')?;
        let (prefix, rest) = rest.split_once(' ')?;
        let login = prefix.split('!').next().filter(|l| !l.is_empty());

        let rest = rest.strip_prefix("PRIVMSG ")?;
        let (channel, text) = match rest.split_once(" :") {
            Some((channel, text)) => (channel, text),
            None => (rest.trim(), ""),
        };

        Some(Self {
            tags,
            login: login.map(str::to_string),
            channel: Some(channel.to_string()),
            text: Some(text.to_string()),
        })
    }
}

/// Tags copied into the extras bag untouched.
const PASSTHROUGH_TAGS: [&str; 4] = ["bits", "custom-reward-id", "msg-id", "id"];

/// Splits a raw `key=value;key=value` tag string (without the leading '@').
pub fn parse_tags(tags: &str) -> HashMap<String, String> {
    tags.trim_start_matches('@')
        .split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut kv = pair.splitn(2, '=');
            (
                kv.next().unwrap_or_default().to_owned(),
                kv.next().unwrap_or_default().to_owned(),
            )
        })
        .collect()
}

/// Role flags from the `badges` tag (`broadcaster/1,subscriber/12`) plus `mod=1`.
pub fn roles_from_tags(tags: &HashMap<String, String>) -> ViewerRoles {
    let mut roles = ViewerRoles::default();
    if let Some(badges) = tags.get("badges") {
        for badge in badges.split(',') {
            match badge.split('/').next().unwrap_or_default() {
                "broadcaster" => roles.broadcaster = true,
                "moderator" => roles.moderator = true,
                "vip" => roles.vip = true,
                "subscriber" | "founder" => roles.subscriber = true,
                _ => {}
            }
        }
    }
    if tags.get("mod").is_some_and(|v| v == "1") {
        roles.moderator = true;
    }
    if tags.get("subscriber").is_some_and(|v| v == "1") {
        roles.subscriber = true;
    }
    if tags.get("vip").is_some_and(|v| v == "1") {
        roles.vip = true;
    }
    roles
}

impl Normalize for TwitchIrcEvent {
    fn normalize(self) -> ChatMessage {
        let roles = roles_from_tags(&self.tags);
        let extras = PASSTHROUGH_TAGS
            .iter()
            .filter_map(|k| {
                self.tags
                    .get(*k)
                    .filter(|v| !v.is_empty())
                    .map(|v| (k.to_string(), v.clone()))
            })
            .collect();

        RawChatEvent {
            platform: Some(Platform::Twitch),
            channel: self.channel.map(|c| c.trim_start_matches('#').to_string()),
            text: self.text,
            username: self.login,
            display_name: self.tags.get("display-name").cloned(),
            user_id: self.tags.get("user-id").cloned(),
            roles: Some(roles),
            extras,
        }
        .normalize()
    }
}
