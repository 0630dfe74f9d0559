// File: chatgate-core/src/repositories/memory.rs
//! In-process repositories. Used when no database URL is configured, and by tests.

use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use chatgate_common::models::{CooldownSnapshot, Viewer};
use chatgate_common::traits::repository_traits::{CooldownRepository, ViewerRepository};
use crate::Error;

#[derive(Clone, Default)]
pub struct InMemoryViewerRepository {
    viewers: Arc<DashMap<String, Viewer>>,
}

impl InMemoryViewerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

#[async_trait]
impl ViewerRepository for InMemoryViewerRepository {
    async fn get_or_create(&self, template: &Viewer) -> Result<Viewer, Error> {
        let entry = self
            .viewers
            .entry(template.identity_key.clone())
            .or_insert_with(|| template.clone());
        Ok(entry.value().clone())
    }

    async fn get(&self, identity_key: &str) -> Result<Option<Viewer>, Error> {
        Ok(self.viewers.get(identity_key).map(|v| v.value().clone()))
    }

    async fn update(&self, viewer: &Viewer) -> Result<(), Error> {
        match self.viewers.get_mut(&viewer.identity_key) {
            Some(mut existing) => {
                *existing = viewer.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("viewer '{}'", viewer.identity_key))),
        }
    }
}

/// Keeps the last saved snapshot and counts saves.
#[derive(Clone, Default)]
pub struct InMemoryCooldownRepository {
    stored: Arc<Mutex<(CooldownSnapshot, usize)>>,
}

impl InMemoryCooldownRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: CooldownSnapshot) -> Self {
        Self { stored: Arc::new(Mutex::new((snapshot, 0))) }
    }

    pub fn save_count(&self) -> usize {
        self.stored.lock().1
    }

    pub fn stored(&self) -> CooldownSnapshot {
        self.stored.lock().0.clone()
    }
}

#[async_trait]
impl CooldownRepository for InMemoryCooldownRepository {
    async fn load(&self) -> Result<CooldownSnapshot, Error> {
        Ok(self.stored.lock().0.clone())
    }

    async fn save(&self, snapshot: &CooldownSnapshot) -> Result<(), Error> {
        let mut lock = self.stored.lock();
        lock.0 = snapshot.clone();
        lock.1 += 1;
        Ok(())
    }
}
