// File: chatgate-core/src/repositories/mod.rs

pub mod memory;
pub mod postgres;

pub use chatgate_common::traits::repository_traits::{CooldownRepository, ViewerRepository};
pub use memory::{InMemoryCooldownRepository, InMemoryViewerRepository};
pub use postgres::{PostgresCooldownRepository, PostgresViewerRepository};
