// File: chatgate-core/src/test_utils/mod.rs
//! Deterministic stand-ins used by unit and integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use chatgate_common::traits::platform_traits::PlatformSender;
use crate::Error;
use crate::utils::time::Clock;

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2025-03-01T12:00:00Z
        Self::starting_at(DateTime::from_timestamp(1_740_830_400, 0).unwrap_or_default())
    }
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Records every outbound message instead of sending it.
#[derive(Clone)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    connected: Arc<AtomicBool>,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// `(channel, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// Polls until at least `count` messages were sent or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: std::time::Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.sent.lock().len() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.texts()
    }
}

#[async_trait]
impl PlatformSender for RecordingSender {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), Error> {
        self.sent.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}
