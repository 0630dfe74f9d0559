// File: chatgate-core/src/lib.rs

pub mod config;
pub mod db;
pub mod eventbus;
pub mod repositories;
pub mod services;
pub mod tasks;
pub mod test_utils;
pub mod utils;

pub use chatgate_common::error::Error;
pub use config::GovernanceConfig;
pub use db::Database;
