// File: chatgate-core/src/eventbus/observer.rs
//! Trait-style observers driven off the event bus. Every observer gets its own queue
//! and its own task, and each callback runs under `catch_unwind`, so a slow, failing
//! or panicking observer affects nobody but itself.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use chatgate_common::models::ChatMessage;
use crate::Error;
use crate::eventbus::{BotEvent, EventBus};

#[async_trait]
pub trait DispatchObserver: Send + Sync {
    fn name(&self) -> &str;

    async fn on_message_processed(&self, _message: &ChatMessage) -> Result<(), Error> {
        Ok(())
    }

    async fn on_command_executed(
        &self,
        _message: &ChatMessage,
        _result_text: &str,
    ) -> Result<(), Error> {
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn deliver(observer: &dyn DispatchObserver, event: &BotEvent) {
    let result = match event {
        BotEvent::MessageProcessed { message, .. } => {
            AssertUnwindSafe(observer.on_message_processed(message))
                .catch_unwind()
                .await
        }
        BotEvent::CommandExecuted { message, result_text, .. } => {
            AssertUnwindSafe(observer.on_command_executed(message, result_text))
                .catch_unwind()
                .await
        }
        BotEvent::SystemMessage(_) => return,
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Observer '{}' failed on {}: {:?}", observer.name(), event.event_type(), e),
        Err(panic) => error!(
            "Observer '{}' panicked on {}: {}",
            observer.name(),
            event.event_type(),
            panic_message(panic.as_ref())
        ),
    }
}

/// Subscribes `observer` to the bus and drives it on a dedicated task until the bus
/// shuts down (queued events are drained first).
pub fn spawn_observer(
    event_bus: &EventBus,
    observer: Arc<dyn DispatchObserver>,
    buffer_size: Option<usize>,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(buffer_size);
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("Observer '{}' started", observer.name());
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => deliver(observer.as_ref(), &event).await,
                        None => break,
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            deliver(observer.as_ref(), &event).await;
        }
        info!("Observer '{}' stopped", observer.name());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use chatgate_common::models::Platform;

    struct Panicky;

    #[async_trait]
    impl DispatchObserver for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        async fn on_message_processed(&self, _message: &ChatMessage) -> Result<(), Error> {
            panic!("observer exploded");
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DispatchObserver for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn on_message_processed(&self, message: &ChatMessage) -> Result<(), Error> {
            self.seen.lock().push(message.text.clone());
            Ok(())
        }
        async fn on_command_executed(&self, _m: &ChatMessage, result_text: &str) -> Result<(), Error> {
            self.seen.lock().push(format!("result:{}", result_text));
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_observer_does_not_stop_others() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        let h1 = spawn_observer(&bus, Arc::new(Panicky), None);
        let h2 = spawn_observer(&bus, recorder.clone(), None);

        let msg = ChatMessage::new(Platform::Console, "neko", "hello");
        bus.publish(BotEvent::MessageProcessed { message: msg.clone(), timestamp: Utc::now() });
        bus.publish(BotEvent::CommandExecuted {
            message: msg,
            command: "ping".into(),
            result_text: "pong".into(),
            timestamp: Utc::now(),
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        bus.shutdown();
        h1.await.expect("panicky observer task itself must not die");
        h2.await.unwrap();

        assert_eq!(*recorder.seen.lock(), vec!["hello".to_string(), "result:pong".to_string()]);
    }
}
