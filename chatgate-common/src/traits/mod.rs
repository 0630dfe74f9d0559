// File: chatgate-common/src/traits/mod.rs

pub mod repository_traits;
pub mod platform_traits;
