// File: chatgate-core/src/services/builtin_commands/ping.rs

use async_trait::async_trait;
use crate::Error;
use crate::services::command_handler::{CommandContext, CommandHandler};

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn execute(&self, _ctx: &CommandContext<'_>) -> Result<String, Error> {
        Ok("pong".to_string())
    }
}
