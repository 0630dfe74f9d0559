// File: chatgate-core/src/services/builtin_commands/balance.rs

use async_trait::async_trait;
use crate::Error;
use crate::services::command_handler::{CommandContext, CommandHandler};

/// `!balance`: reports the caller's coins and karma.
pub struct BalanceCommand;

#[async_trait]
impl CommandHandler for BalanceCommand {
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<String, Error> {
        Ok(format!(
            "@{} you have {} coins and {} karma.",
            ctx.message.reply_name(),
            ctx.viewer.coins,
            ctx.viewer.karma
        ))
    }
}
