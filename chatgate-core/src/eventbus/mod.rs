// File: chatgate-core/src/eventbus/mod.rs
//! In-process fan-out of dispatcher notifications. Each subscriber owns a bounded
//! queue; publishing never waits on a subscriber. A full queue drops the event for
//! that subscriber only, a closed queue is unsubscribed.

pub mod observer;

use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use chatgate_common::models::ChatMessage;

/// Events the dispatcher raises for external subsystems (economy, logging...).
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// Raised once per inbound message after it went through the dispatcher.
    MessageProcessed {
        message: ChatMessage,
        timestamp: DateTime<Utc>,
    },

    /// Raised after a command handler completed successfully.
    CommandExecuted {
        message: ChatMessage,
        command: String,
        result_text: String,
        timestamp: DateTime<Utc>,
    },

    SystemMessage(String),
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::MessageProcessed { .. } => "message_processed",
            BotEvent::CommandExecuted { .. } => "command_executed",
            BotEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1);
        let (tx, rx) = mpsc::channel(size);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Best-effort delivery to every subscriber. Never blocks.
    pub fn publish(&self, event: BotEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber queue full; dropping '{}' event for it", event.event_type());
                true
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Subscriber went away; removing it");
                false
            }
        });
    }
}
