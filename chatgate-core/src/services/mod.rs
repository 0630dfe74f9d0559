// File: chatgate-core/src/services/mod.rs

pub mod builtin_commands;
pub mod command_handler;
pub mod command_registry;
pub mod cooldown_governor;
pub mod dispatcher;
pub mod message_sender;
pub mod normalizer;
pub mod permission;
pub mod viewer_service;

pub use command_handler::{CommandContext, CommandHandler, HandlerRegistry};
pub use command_registry::CommandRegistry;
pub use cooldown_governor::{CooldownGovernor, QuotaSettings};
pub use dispatcher::{DispatchOutcome, Dispatcher, PassiveChatHandler, Rejection};
pub use message_sender::{OutboundRouter, PlatformLimits, SentenceSplitter};
pub use viewer_service::{StartingBalance, ViewerService};
