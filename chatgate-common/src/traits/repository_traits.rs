// File: chatgate-common/src/traits/repository_traits.rs

use async_trait::async_trait;
use crate::Error;
use crate::models::{CooldownSnapshot, Viewer};

/// Read/write interface onto the external viewer ledger.
#[async_trait]
pub trait ViewerRepository: Send + Sync {
    /// Returns the stored viewer for `template.identity_key`, inserting `template`
    /// first if none exists. Must be atomic per identity key so that two concurrent
    /// first contacts still produce a single viewer.
    async fn get_or_create(&self, template: &Viewer) -> Result<Viewer, Error>;
    async fn get(&self, identity_key: &str) -> Result<Option<Viewer>, Error>;
    async fn update(&self, viewer: &Viewer) -> Result<(), Error>;
}

/// Durable home of the cooldown governor's state.
#[async_trait]
pub trait CooldownRepository: Send + Sync {
    async fn load(&self) -> Result<CooldownSnapshot, Error>;
    /// Replaces the stored state with `snapshot`.
    async fn save(&self, snapshot: &CooldownSnapshot) -> Result<(), Error>;
}
