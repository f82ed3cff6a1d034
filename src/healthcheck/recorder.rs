//! Keepalive recorder.
//!
//! Writes the current epoch seconds into the keepalive entity each time the
//! keepalive event fires.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::EVENT_NAME;
use crate::host::{EventBus, ListenerHandle, StateStore};

#[derive(Clone)]
pub struct KeepaliveRecorder {
    states: StateStore,
    clock: Arc<dyn Clock>,
    entity_id: String,
}

impl KeepaliveRecorder {
    pub fn new(states: StateStore, clock: Arc<dyn Clock>, entity_id: impl Into<String>) -> Self {
        Self {
            states,
            clock,
            entity_id: entity_id.into(),
        }
    }

    /// Record `now` as the last keepalive.
    ///
    /// Failures are logged and swallowed; the next tick writes again.
    pub async fn record_keepalive(&self) {
        let now = self.clock.now().timestamp();
        match self.states.set(&self.entity_id, now.to_string()).await {
            Ok(_) => {
                tracing::debug!(entity_id = %self.entity_id, timestamp = now, "Keepalive recorded");
            }
            Err(e) => {
                tracing::error!(
                    entity_id = %self.entity_id,
                    error = %e,
                    "Failed to record keepalive"
                );
            }
        }
    }

    /// Subscribe the recorder to the keepalive event
    pub fn listen(&self, bus: &EventBus) -> ListenerHandle {
        let recorder = self.clone();
        bus.listen(EVENT_NAME, move |_event| {
            let recorder = recorder.clone();
            async move { recorder.record_keepalive().await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::ENTITY_NAME;
    use std::time::Duration;

    fn setup() -> (KeepaliveRecorder, StateStore, EventBus, Arc<MockClock>) {
        let clock = Arc::new(MockClock::at_timestamp(1_700_000_000));
        let bus = EventBus::new(16, clock.clone());
        let states = StateStore::new(bus.clone(), clock.clone());
        let recorder = KeepaliveRecorder::new(states.clone(), clock.clone(), ENTITY_NAME);
        (recorder, states, bus, clock)
    }

    #[tokio::test]
    async fn test_record_keepalive_writes_epoch_seconds() {
        let (recorder, states, _, _) = setup();
        recorder.record_keepalive().await;

        let record = states.get(ENTITY_NAME).await.unwrap();
        assert_eq!(record.state, "1700000000");
    }

    #[tokio::test]
    async fn test_second_record_keeps_later_timestamp() {
        let (recorder, states, _, clock) = setup();
        recorder.record_keepalive().await;
        clock.advance(chrono::Duration::seconds(3));
        recorder.record_keepalive().await;

        let record = states.get(ENTITY_NAME).await.unwrap();
        assert_eq!(record.state, "1700000003");
    }

    #[tokio::test]
    async fn test_invalid_entity_is_swallowed() {
        let clock = Arc::new(MockClock::at_timestamp(1_700_000_000));
        let bus = EventBus::new(16, clock.clone());
        let states = StateStore::new(bus, clock.clone());
        let recorder = KeepaliveRecorder::new(states.clone(), clock, "Not Valid");

        recorder.record_keepalive().await;
        assert!(states.get("Not Valid").await.is_none());
    }

    #[tokio::test]
    async fn test_listener_records_on_keepalive_event() {
        let (recorder, states, bus, _) = setup();
        let _handle = recorder.listen(&bus);

        bus.fire(EVENT_NAME, serde_json::Value::Null);

        let mut recorded = None;
        for _ in 0..50 {
            recorded = states.get(ENTITY_NAME).await;
            if recorded.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorded.unwrap().state, "1700000000");
    }
}
