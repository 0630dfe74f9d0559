// File: chatgate-core/src/utils/time.rs

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for every gate check. Injected so that cooldown and quota windows
/// can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whole seconds left in `remaining`, rounded up so a 2.1s wait reads as "3s".
pub fn ceil_seconds(remaining: Duration) -> i64 {
    let millis = remaining.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        millis.saturating_add(999) / 1000
    }
}
