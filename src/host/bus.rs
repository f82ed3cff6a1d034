//! In-process event bus.
//!
//! A tokio broadcast channel carries every event to every listener. Each
//! listener runs on its own task and filters by event type, so a slow
//! handler never blocks the code that fired the event.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// An event as seen by listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub time_fired: DateTime<Utc>,
}

/// Cloneable handle to the host event bus
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, clock }
    }

    /// Fire an event to all current listeners.
    ///
    /// Returns immediately; delivery happens on the listener tasks.
    pub fn fire(&self, event_type: &str, data: serde_json::Value) {
        let event = Event {
            event_type: event_type.to_string(),
            data,
            time_fired: self.clock.now(),
        };
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(event_type, receivers, "Event fired"),
            Err(_) => tracing::trace!(event_type, "Event fired with no listeners"),
        }
    }

    /// Raw subscription to every event on the bus
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Run `handler` for every event of `event_type` until the handle is removed.
    ///
    /// The subscription is taken before this returns, so events fired
    /// afterwards are never missed (barring channel lag).
    pub fn listen<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> ListenerHandle
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event_type = event_type.into();
        let mut receiver = self.sender.subscribe();
        let filter = event_type.clone();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.event_type == filter => handler(event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(event_type = %filter, skipped, "Listener lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(event_type = %filter, "Event bus closed");
                        break;
                    }
                }
            }
        });

        tracing::debug!(event_type = %event_type, "Listener registered");
        ListenerHandle { event_type, task }
    }
}

/// A registered listener; removing it stops delivery
#[derive(Debug)]
pub struct ListenerHandle {
    event_type: String,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Unsubscribe the listener
    pub fn remove(self) {
        self.task.abort();
        tracing::debug!(event_type = %self.event_type, "Listener removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn bus() -> EventBus {
        EventBus::new(16, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_listener_receives_matching_events_only() {
        let bus = bus();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _handle = bus.listen("ping", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.event_type);
            }
        });

        bus.fire("pong", serde_json::Value::Null);
        bus.fire("ping", serde_json::json!({"n": 1}));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, "ping");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fire_without_listeners_does_not_panic() {
        bus().fire("nobody_listens", serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_removed_listener_stops_receiving() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handle = bus.listen("tick", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(handle.event_type(), "tick");

        handle.remove();
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.fire("tick", serde_json::Value::Null);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
