// File: chatgate-core/src/services/command_handler.rs
//! Typed handler registry. Configuration names a handler key; keys are bound to
//! implementations explicitly at startup.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;

use chatgate_common::models::{ChatMessage, CommandDescriptor, Viewer};
use crate::Error;
use crate::services::command_registry::CommandRegistry;
use crate::services::viewer_service::ViewerService;

/// Everything a handler may look at while running one command.
pub struct CommandContext<'a> {
    pub message: &'a ChatMessage,
    pub viewer: &'a Viewer,
    pub descriptor: &'a CommandDescriptor,
    /// Text after the command token, trimmed.
    pub args: &'a str,
    /// Prefix the command was invoked with (for replies that mention other commands).
    pub prefix: &'a str,
    pub registry: &'a CommandRegistry,
    pub viewer_service: &'a ViewerService,
}

/// The business logic behind a command. The returned text is sent back to chat;
/// an empty string means "nothing to say".
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<String, Error>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::services::builtin_commands::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, key: &str, handler: Arc<dyn CommandHandler>) -> &mut Self {
        self.handlers.insert(key.to_ascii_lowercase(), handler);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&key.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(&key.to_ascii_lowercase())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }
}
