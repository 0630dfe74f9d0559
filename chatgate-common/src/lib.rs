// File: chatgate-common/src/lib.rs
//! Shared models, traits and the error type used by every chatgate crate.

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
