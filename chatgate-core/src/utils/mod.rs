// File: chatgate-core/src/utils/mod.rs

pub mod time;
