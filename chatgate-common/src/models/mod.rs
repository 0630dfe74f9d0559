// File: chatgate-common/src/models/mod.rs
pub mod platform;
pub mod message;
pub mod viewer;
pub mod command;
pub mod cooldown;

pub use platform::Platform;
pub use message::ChatMessage;
pub use viewer::{Viewer, ViewerRoles};
pub use command::{CommandDescriptor, EventType, PermissionLevel};
pub use cooldown::{CooldownSnapshot, EventExecution, UserCooldownEntry};
