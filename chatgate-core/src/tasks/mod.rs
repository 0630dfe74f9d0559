// File: chatgate-core/src/tasks/mod.rs

pub mod cooldown_flush;

pub use cooldown_flush::{restore_cooldowns, spawn_cooldown_flush_task};
