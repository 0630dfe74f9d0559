// File: chatgate-core/src/repositories/postgres/mod.rs

pub mod viewer;
pub mod cooldown;

pub use viewer::PostgresViewerRepository;
pub use cooldown::PostgresCooldownRepository;
