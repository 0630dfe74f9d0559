// File: chatgate-server/src/console.rs
//! Stdin/stdout connector for running the dispatcher by hand.
//!
//! Input lines:
//! - `name: text` chats as `name`
//! - a JSON object is read as a raw chat event (`platform`, `username`, `roles`, ...)
//! - `@tags :nick!nick@host PRIVMSG #chan :text` is read as a Twitch IRC line
//! - `/reload`, `/ban <user>`, `/unban <user>`, `/give <user> <coins> [karma]`, `/quit`
//! - anything else chats as the broadcaster

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatgate_common::models::{ChatMessage, Platform, Viewer, ViewerRoles};
use chatgate_common::traits::platform_traits::PlatformSender;
use chatgate_core::eventbus::{BotEvent, EventBus};
use chatgate_core::eventbus::observer::DispatchObserver;
use chatgate_core::services::normalizer::{Normalize, RawChatEvent, TwitchIrcEvent};
use chatgate_core::services::{DispatchOutcome, Dispatcher, PassiveChatHandler};
use chatgate_core::{Error, GovernanceConfig};

const OPERATOR: &str = "console";

pub struct ConsoleSender;

#[async_trait]
impl PlatformSender for ConsoleSender {
    fn is_connected(&self) -> bool {
        true
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), Error> {
        if channel.is_empty() {
            println!("bot> {}", text);
        } else {
            println!("[{}] bot> {}", channel, text);
        }
        Ok(())
    }
}

/// Non-command chat goes to the log.
pub struct ChatLog;

#[async_trait]
impl PassiveChatHandler for ChatLog {
    async fn handle_chat(&self, message: &ChatMessage, viewer: &Viewer) {
        debug!(
            "[{}] {} ({} coins): {}",
            message.platform, viewer.username, viewer.coins, message.text
        );
    }
}

/// Writes every executed command to the log.
pub struct CommandAudit;

#[async_trait]
impl DispatchObserver for CommandAudit {
    fn name(&self) -> &str {
        "command-audit"
    }

    async fn on_command_executed(
        &self,
        message: &ChatMessage,
        result_text: &str,
    ) -> Result<(), Error> {
        info!(
            "{} ran {:?} on {} -> {:?}",
            message.identity_key(),
            message.text,
            message.platform,
            result_text
        );
        Ok(())
    }
}

enum ConsoleInput {
    Chat(ChatMessage),
    Reload,
    Ban(String, bool),
    Give { user: String, coins: i64, karma: i64 },
    Quit,
    Invalid(String),
}

fn parse_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(cmd) = line.strip_prefix('/') {
        let mut words = cmd.split_whitespace();
        let input = match (words.next(), words.next()) {
            (Some("reload"), _) => ConsoleInput::Reload,
            (Some("quit"), _) => ConsoleInput::Quit,
            (Some("ban"), Some(user)) => ConsoleInput::Ban(user.to_lowercase(), true),
            (Some("unban"), Some(user)) => ConsoleInput::Ban(user.to_lowercase(), false),
            (Some("give"), Some(user)) => {
                let coins = words.next().and_then(|c| c.parse().ok());
                let karma = words.next().map(|k| k.parse().ok()).unwrap_or(Some(0));
                match (coins, karma) {
                    (Some(coins), Some(karma)) => ConsoleInput::Give {
                        user: user.to_lowercase(),
                        coins,
                        karma,
                    },
                    _ => ConsoleInput::Invalid("usage: /give <user> <coins> [karma]".into()),
                }
            }
            _ => ConsoleInput::Invalid(format!("unknown console command '/{}'", cmd)),
        };
        return Some(input);
    }

    if line.starts_with('{') {
        return Some(match serde_json::from_str::<RawChatEvent>(line) {
            Ok(event) => ConsoleInput::Chat(event.normalize()),
            Err(e) => ConsoleInput::Invalid(format!("bad event JSON: {}", e)),
        });
    }

    if line.starts_with('@') || line.starts_with(':') {
        return Some(match TwitchIrcEvent::parse_line(line) {
            Some(event) => ConsoleInput::Chat(event.normalize()),
            None => ConsoleInput::Invalid("not a PRIVMSG line".into()),
        });
    }

    let event = match line.split_once(": ") {
        Some((user, text)) if !user.contains(char::is_whitespace) => RawChatEvent {
            username: Some(user.to_string()),
            text: Some(text.to_string()),
            ..RawChatEvent::default()
        },
        _ => RawChatEvent {
            username: Some(OPERATOR.to_string()),
            text: Some(line.to_string()),
            roles: Some(ViewerRoles::broadcaster()),
            ..RawChatEvent::default()
        },
    };
    Some(ConsoleInput::Chat(event.normalize()))
}

async fn handle_input(
    dispatcher: &Dispatcher,
    event_bus: &EventBus,
    config_path: &Path,
    input: ConsoleInput,
) {
    match input {
        ConsoleInput::Chat(mut msg) => {
            msg.platform = Platform::Console;
            match dispatcher.process_message(msg).await {
                DispatchOutcome::UnknownCommand => println!("(unknown command)"),
                DispatchOutcome::ViewerUnavailable => println!("(viewer ledger unavailable)"),
                other => debug!("Console dispatch outcome: {:?}", other),
            }
        }
        ConsoleInput::Reload => match GovernanceConfig::load(config_path).await {
            Ok(config) => {
                dispatcher.apply_config(&config);
                event_bus.publish(BotEvent::SystemMessage(format!(
                    "configuration reloaded from {}",
                    config_path.display()
                )));
            }
            Err(e) => error!("Reload failed, keeping current configuration: {}", e),
        },
        ConsoleInput::Ban(user, banned) => {
            if let Err(e) = dispatcher.viewer_service().set_banned(&user, banned).await {
                warn!("Could not update ban for '{}': {}", user, e);
            }
        }
        ConsoleInput::Give { user, coins, karma } => {
            match dispatcher.viewer_service().adjust_balance(&user, coins, karma).await {
                Ok(v) => println!("{} now has {} coins and {} karma", v.username, v.coins, v.karma),
                Err(e) => warn!("Could not adjust balance for '{}': {}", user, e),
            }
        }
        ConsoleInput::Quit => event_bus.shutdown(),
        ConsoleInput::Invalid(why) => println!("({})", why),
    }
}

/// Reads stdin on a plain thread (a blocking read would otherwise hold up runtime
/// shutdown) and feeds each line to the dispatcher in order.
pub fn spawn_console_connector(
    dispatcher: Arc<Dispatcher>,
    event_bus: Arc<EventBus>,
    config_path: PathBuf,
) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<String>(64);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    tokio::spawn(async move {
        info!("Console connector ready. Type 'name: text' to chat, /quit to exit.");
        loop {
            tokio::select! {
                maybe_line = rx.recv() => {
                    let Some(line) = maybe_line else {
                        info!("Console input closed; shutting down.");
                        event_bus.shutdown();
                        break;
                    };
                    if let Some(input) = parse_line(&line) {
                        handle_input(&dispatcher, &event_bus, &config_path, input).await;
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(line: &str) -> ChatMessage {
        match parse_line(line) {
            Some(ConsoleInput::Chat(msg)) => msg,
            _ => panic!("expected chat for {:?}", line),
        }
    }

    #[test]
    fn named_chat_line() {
        let msg = chat("alice: !weather in Paris");
        assert_eq!(msg.username, "alice");
        assert_eq!(msg.text, "!weather in Paris");
        assert!(msg.roles.is_none());
    }

    #[test]
    fn bare_line_is_the_operator() {
        let msg = chat("!raid somebody");
        assert_eq!(msg.username, OPERATOR);
        assert!(msg.roles.unwrap().broadcaster);
    }

    #[test]
    fn json_and_irc_lines() {
        let msg = chat(r#"{"username": "bob", "text": "!ping", "roles": {"moderator": true}}"#);
        assert!(msg.roles.unwrap().moderator);

        let msg = chat("@badges=vip/1;user-id=9 :carol!carol@carol.tmi.twitch.tv PRIVMSG #chan :!hug");
        assert_eq!(msg.identity_key(), "9");
        assert_eq!(msg.text, "!hug");
    }

    #[test]
    fn console_commands() {
        assert!(matches!(parse_line("/reload"), Some(ConsoleInput::Reload)));
        assert!(matches!(parse_line("/ban Troll"), Some(ConsoleInput::Ban(u, true)) if u == "troll"));
        assert!(matches!(
            parse_line("/give bob 50"),
            Some(ConsoleInput::Give { coins: 50, karma: 0, .. })
        ));
        assert!(matches!(parse_line("/give bob lots"), Some(ConsoleInput::Invalid(_))));
        assert!(matches!(parse_line("/dance"), Some(ConsoleInput::Invalid(_))));
        assert!(parse_line("   ").is_none());
    }
}
