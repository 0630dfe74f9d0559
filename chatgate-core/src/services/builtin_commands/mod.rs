// File: chatgate-core/src/services/builtin_commands/mod.rs
//! Built-in command handlers, one per file. `register_builtins` binds each to its
//! handler key; descriptors select them by `handler` (or by name when empty).

pub mod ping;
pub mod balance;
pub mod commands_list;
pub mod reply;

use std::sync::Arc;
use crate::services::command_handler::HandlerRegistry;

pub fn register_builtins(registry: &mut HandlerRegistry) {
    registry
        .register("ping", Arc::new(ping::PingCommand))
        .register("balance", Arc::new(balance::BalanceCommand))
        .register("commands", Arc::new(commands_list::CommandsListCommand))
        .register("reply", Arc::new(reply::ReplyCommand));
}
