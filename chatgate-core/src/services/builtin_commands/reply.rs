// File: chatgate-core/src/services/builtin_commands/reply.rs

use async_trait::async_trait;
use crate::Error;
use crate::services::command_handler::{CommandContext, CommandHandler};

/// Answers with the descriptor's configured `response`, substituting `{user}` and `{args}`.
pub struct ReplyCommand;

#[async_trait]
impl CommandHandler for ReplyCommand {
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<String, Error> {
        let template = ctx.descriptor.response.as_deref().ok_or_else(|| {
            Error::Handler(format!("command '{}' has no response configured", ctx.descriptor.name))
        })?;
        Ok(template
            .replace("{user}", ctx.message.reply_name())
            .replace("{args}", ctx.args))
    }
}
