// File: chatgate-core/src/services/viewer_service.rs

use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, info};

use chatgate_common::models::{ChatMessage, Viewer};
use chatgate_common::traits::repository_traits::ViewerRepository;
use crate::Error;
use crate::utils::time::Clock;

/// Balances handed to a viewer on first contact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartingBalance {
    pub coins: i64,
    pub karma: i64,
}

/// Thin layer over the external viewer ledger: lazy creation, role sync, bans, balances.
pub struct ViewerService {
    repo: Arc<dyn ViewerRepository>,
    clock: Arc<dyn Clock>,
    starting: RwLock<StartingBalance>,
}

impl ViewerService {
    pub fn new(
        repo: Arc<dyn ViewerRepository>,
        clock: Arc<dyn Clock>,
        starting: StartingBalance,
    ) -> Self {
        Self {
            repo,
            clock,
            starting: RwLock::new(starting),
        }
    }

    pub fn set_starting_balance(&self, starting: StartingBalance) {
        *self.starting.write() = starting;
    }

    /// Resolves the sender of `msg`, creating it with the starting balance if this is the
    /// first contact. Role flags reported with the message replace the stored ones.
    pub async fn get_or_create_viewer(&self, msg: &ChatMessage) -> Result<Viewer, Error> {
        let identity_key = msg.identity_key();
        let now = self.clock.now();
        let starting = *self.starting.read();

        let mut template = Viewer::new(
            &identity_key,
            msg.platform,
            &msg.username,
            starting.coins,
            starting.karma,
            now,
        );
        if let Some(roles) = msg.roles {
            template.roles = roles;
        }

        let mut viewer = self.repo.get_or_create(&template).await?;
        if viewer.created_at == now && viewer.last_seen == now {
            info!("New viewer '{}' ({}) on {}", msg.username, identity_key, msg.platform);
        }

        let mut changed = false;
        if let Some(roles) = msg.roles {
            if viewer.roles != roles {
                debug!("Syncing roles for '{}': {:?} -> {:?}", identity_key, viewer.roles, roles);
                viewer.roles = roles;
                changed = true;
            }
        }
        if !msg.username.is_empty() && viewer.username != msg.username {
            viewer.username = msg.username.clone();
            changed = true;
        }
        if changed {
            viewer.last_seen = now;
            self.repo.update(&viewer).await?;
        }
        Ok(viewer)
    }

    pub async fn get_viewer(&self, identity_key: &str) -> Result<Option<Viewer>, Error> {
        self.repo.get(identity_key).await
    }

    pub async fn set_banned(&self, identity_key: &str, banned: bool) -> Result<Viewer, Error> {
        let mut viewer = self
            .repo
            .get(identity_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("viewer '{}'", identity_key)))?;
        viewer.banned = banned;
        self.repo.update(&viewer).await?;
        info!("Viewer '{}' banned={}", identity_key, banned);
        Ok(viewer)
    }

    pub async fn adjust_balance(
        &self,
        identity_key: &str,
        coins_delta: i64,
        karma_delta: i64,
    ) -> Result<Viewer, Error> {
        let mut viewer = self
            .repo
            .get(identity_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("viewer '{}'", identity_key)))?;
        viewer.coins = viewer.coins.saturating_add(coins_delta);
        viewer.karma = viewer.karma.saturating_add(karma_delta);
        self.repo.update(&viewer).await?;
        Ok(viewer)
    }
}
