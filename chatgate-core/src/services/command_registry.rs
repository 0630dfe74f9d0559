// File: chatgate-core/src/services/command_registry.rs
//! Name/alias -> descriptor lookup.
//!
//! Read-mostly: lookups take a shared lock, writes only happen on registration or
//! configuration reload. Aliases live in their own index so resolution is O(1).
//!
//! Overwrite policy: re-registering a name drops every alias that pointed at the old
//! descriptor (cascade-remove); only the new descriptor's alias is bound afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use chatgate_common::models::CommandDescriptor;
use crate::Error;
use crate::services::cooldown_governor::MAX_COOLDOWN_SECONDS;

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<CommandDescriptor>>,
    /// lowercased alias -> lowercased primary name
    aliases: HashMap<String, String>,
}

impl RegistryInner {
    fn insert(&mut self, descriptor: CommandDescriptor) -> Option<Arc<CommandDescriptor>> {
        let key = descriptor.name.to_ascii_lowercase();
        let alias = descriptor
            .alias
            .as_deref()
            .map(|a| a.trim().to_ascii_lowercase())
            .filter(|a| !a.is_empty() && *a != key);

        let previous = self.by_name.insert(key.clone(), Arc::new(descriptor));
        if previous.is_some() {
            self.aliases.retain(|_, target| *target != key);
        }

        if let Some(alias) = alias {
            if self.by_name.contains_key(&alias) {
                warn!("Alias '{}' of '{}' shadows a command name; the name wins on lookup", alias, key);
            }
            if let Some(old_target) = self.aliases.insert(alias.clone(), key.clone()) {
                if old_target != key {
                    warn!("Alias '{}' rebound from '{}' to '{}'", alias, old_target, key);
                }
            }
        }
        previous
    }

    fn remove(&mut self, name: &str) -> Option<Arc<CommandDescriptor>> {
        let key = name.to_ascii_lowercase();
        let removed = self.by_name.remove(&key);
        if removed.is_some() {
            self.aliases.retain(|_, target| *target != key);
        }
        removed
    }
}

fn validate(descriptor: &CommandDescriptor) -> Result<(), Error> {
    if descriptor.name.trim().is_empty() {
        return Err(Error::Config("command name must not be empty".into()));
    }
    if descriptor.name.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "command name '{}' must not contain whitespace",
            descriptor.name
        )));
    }
    if descriptor.cooldown_seconds > MAX_COOLDOWN_SECONDS {
        return Err(Error::Config(format!(
            "cooldown of '{}' exceeds {} seconds",
            descriptor.name, MAX_COOLDOWN_SECONDS
        )));
    }
    Ok(())
}

/// The set of known commands, shared by every concurrent dispatch.
#[derive(Default)]
pub struct CommandRegistry {
    inner: RwLock<RegistryInner>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces by primary name (last writer wins). Returns the replaced
    /// descriptor, if any.
    pub fn register(
        &self,
        descriptor: CommandDescriptor,
    ) -> Result<Option<Arc<CommandDescriptor>>, Error> {
        validate(&descriptor)?;
        debug!("Registering command '{}' (alias={:?})", descriptor.name, descriptor.alias);
        Ok(self.inner.write().insert(descriptor))
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.inner.write().remove(name)
    }

    /// Swaps in a whole new command set atomically (configuration reload).
    /// Invalid descriptors are skipped and logged. Returns how many were loaded.
    pub fn replace_all(&self, descriptors: impl IntoIterator<Item = CommandDescriptor>) -> usize {
        let mut fresh = RegistryInner::default();
        for descriptor in descriptors {
            if let Err(e) = validate(&descriptor) {
                warn!("Skipping invalid command descriptor: {}", e);
                continue;
            }
            if fresh.insert(descriptor).is_some() {
                debug!("Duplicate command name in reload; last definition wins");
            }
        }
        let count = fresh.by_name.len();
        *self.inner.write() = fresh;
        debug!("Command registry reloaded with {} commands", count);
        count
    }

    /// ASCII-case-insensitive lookup: primary names first, then aliases.
    pub fn resolve(&self, token: &str) -> Option<Arc<CommandDescriptor>> {
        let token = token.to_ascii_lowercase();
        let inner = self.inner.read();
        if let Some(found) = inner.by_name.get(&token) {
            return Some(found.clone());
        }
        inner
            .aliases
            .get(&token)
            .and_then(|name| inner.by_name.get(name))
            .cloned()
    }

    /// All descriptors, sorted by name.
    pub fn list(&self) -> Vec<Arc<CommandDescriptor>> {
        let mut all: Vec<_> = self.inner.read().by_name.values().cloned().collect();
        all.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
