// File: chatgate-core/src/services/permission.rs
//! Role-hierarchy checks: everyone < subscriber < vip < moderator < broadcaster.

use chatgate_common::models::{PermissionLevel, ViewerRoles};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied { required: PermissionLevel },
    /// The configured level is not a known role; treated as a denial.
    Unrecognized { configured: String },
}

impl PermissionDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionDecision::Granted)
    }
}

/// Highest level the viewer's flags reach.
pub fn highest_level(roles: &ViewerRoles) -> PermissionLevel {
    if roles.broadcaster {
        PermissionLevel::Broadcaster
    } else if roles.moderator {
        PermissionLevel::Moderator
    } else if roles.vip {
        PermissionLevel::Vip
    } else if roles.subscriber {
        PermissionLevel::Subscriber
    } else {
        PermissionLevel::Everyone
    }
}

/// A viewer satisfies `required` when it holds that flag or any flag above it.
pub fn satisfies(roles: &ViewerRoles, required: PermissionLevel) -> bool {
    highest_level(roles) >= required
}

/// Evaluates a raw configured level string. Unknown strings fail closed.
pub fn evaluate(roles: &ViewerRoles, configured: &str) -> PermissionDecision {
    match configured.parse::<PermissionLevel>() {
        Ok(required) if satisfies(roles, required) => PermissionDecision::Granted,
        Ok(required) => PermissionDecision::Denied { required },
        Err(_) => PermissionDecision::Unrecognized { configured: configured.to_string() },
    }
}
