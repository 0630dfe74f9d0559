// File: chatgate-common/src/models/platform.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// The chat platform a message arrived on (and the one a reply goes back to).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Discord,
    YouTube,
    Kick,
    /// Local stdin/stdout connector used by the server binary and tests.
    Console,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Twitch => write!(f, "twitch"),
            Platform::Discord => write!(f, "discord"),
            Platform::YouTube => write!(f, "youtube"),
            Platform::Kick => write!(f, "kick"),
            Platform::Console => write!(f, "console"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitch" | "twitch-irc" => Ok(Platform::Twitch),
            "discord" => Ok(Platform::Discord),
            "youtube" => Ok(Platform::YouTube),
            "kick" => Ok(Platform::Kick),
            "console" => Ok(Platform::Console),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for p in [Platform::Twitch, Platform::Discord, Platform::YouTube, Platform::Kick, Platform::Console] {
            assert_eq!(p.to_string().parse::<Platform>().unwrap(), p);
        }
        assert_eq!("Twitch-IRC".parse::<Platform>().unwrap(), Platform::Twitch);
        assert!("myspace".parse::<Platform>().is_err());
    }
}
