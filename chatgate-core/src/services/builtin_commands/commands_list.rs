// File: chatgate-core/src/services/builtin_commands/commands_list.rs

use async_trait::async_trait;
use crate::Error;
use crate::services::command_handler::{CommandContext, CommandHandler};

/// `!commands`: lists the enabled commands, with aliases.
pub struct CommandsListCommand;

#[async_trait]
impl CommandHandler for CommandsListCommand {
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<String, Error> {
        let listed: Vec<String> = ctx
            .registry
            .list()
            .iter()
            .filter(|d| d.enabled)
            .map(|d| match d.alias.as_deref() {
                Some(alias) if !alias.is_empty() => {
                    format!("{p}{} ({p}{})", d.name, alias, p = ctx.prefix)
                }
                _ => format!("{}{}", ctx.prefix, d.name),
            })
            .collect();

        if listed.is_empty() {
            return Ok("No commands are enabled right now.".to_string());
        }
        Ok(format!("Commands: {}", listed.join(", ")))
    }
}
