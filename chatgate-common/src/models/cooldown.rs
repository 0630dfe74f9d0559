// File: chatgate-common/src/models/cooldown.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::command::EventType;

/// Last successful use of one command by one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCooldownEntry {
    pub identity_key: String,
    pub command_name: String,
    pub last_used: DateTime<Utc>,
}

/// One counted execution of an event-typed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventExecution {
    pub event_type: EventType,
    pub executed_at: DateTime<Utc>,
}

/// Point-in-time copy of the cooldown governor's state, as persisted and restored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    pub user_cooldowns: Vec<UserCooldownEntry>,
    pub event_executions: Vec<EventExecution>,
}
