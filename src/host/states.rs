//! Live current-value state store.
//!
//! Holds the latest state of every entity in memory. Each write is a single
//! indivisible operation under an async `RwLock`, stamped with the host clock,
//! and announced on the bus as `state_changed` so the history backend can
//! persist it without the writer waiting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::config::EVENT_STATE_CHANGED;
use crate::error::StoreError;

use super::bus::EventBus;

/// The state of one entity at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub entity_id: String,
    pub state: String,
    pub last_updated: DateTime<Utc>,
}

/// Payload of a `state_changed` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    pub old_state: Option<StateRecord>,
    pub new_state: StateRecord,
}

/// Check an entity id has the `domain.object_id` shape.
///
/// Both parts are non-empty and made of lowercase ASCII letters, digits and
/// underscores.
pub fn valid_entity_id(entity_id: &str) -> bool {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };

    match entity_id.split_once('.') {
        Some((domain, object_id)) => valid_part(domain) && valid_part(object_id),
        None => false,
    }
}

/// Shared in-memory state store
#[derive(Clone)]
pub struct StateStore {
    states: Arc<RwLock<HashMap<String, StateRecord>>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            bus,
            clock,
        }
    }

    /// Current state of an entity, if it has ever been set
    pub async fn get(&self, entity_id: &str) -> Option<StateRecord> {
        self.states.read().await.get(entity_id).cloned()
    }

    /// Set the current state of an entity and announce the change.
    pub async fn set(
        &self,
        entity_id: &str,
        value: impl Into<String>,
    ) -> Result<StateRecord, StoreError> {
        if !valid_entity_id(entity_id) {
            return Err(StoreError::InvalidEntityId(entity_id.to_string()));
        }

        let new_state = StateRecord {
            entity_id: entity_id.to_string(),
            state: value.into(),
            last_updated: self.clock.now(),
        };

        let old_state = self
            .states
            .write()
            .await
            .insert(entity_id.to_string(), new_state.clone());

        let data = serde_json::to_value(StateChangedData {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: new_state.clone(),
        })?;
        self.bus.fire(EVENT_STATE_CHANGED, data);

        Ok(new_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::time::Duration;

    fn store() -> (StateStore, EventBus, Arc<MockClock>) {
        let clock = Arc::new(MockClock::at_timestamp(1_700_000_000));
        let bus = EventBus::new(16, clock.clone());
        (StateStore::new(bus.clone(), clock.clone()), bus, clock)
    }

    #[test]
    fn test_valid_entity_id() {
        assert!(valid_entity_id("keepalive_probe.last_seen"));
        assert!(valid_entity_id("sensor.temp_1"));
        assert!(!valid_entity_id("no_dot"));
        assert!(!valid_entity_id(".last_seen"));
        assert!(!valid_entity_id("sensor."));
        assert!(!valid_entity_id("Sensor.Temp"));
        assert!(!valid_entity_id("sensor.temp-1"));
    }

    #[tokio::test]
    async fn test_get_unset_entity_is_none() {
        let (states, _, _) = store();
        assert!(states.get("sensor.missing").await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_returns_latest() {
        let (states, _, clock) = store();
        states.set("sensor.a", "1").await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        states.set("sensor.a", "2").await.unwrap();

        let record = states.get("sensor.a").await.unwrap();
        assert_eq!(record.state, "2");
        assert_eq!(record.last_updated.timestamp(), 1_700_000_005);
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_entity_id() {
        let (states, _, _) = store();
        let err = states.set("not an entity", "1").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidEntityId(_)));
        assert!(states.get("not an entity").await.is_none());
    }

    #[tokio::test]
    async fn test_set_fires_state_changed() {
        let (states, bus, _) = store();
        let mut events = bus.subscribe();

        states.set("sensor.a", "1").await.unwrap();
        states.set("sensor.a", "2").await.unwrap();

        let _first = events.recv().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.event_type, EVENT_STATE_CHANGED);

        let data: StateChangedData = serde_json::from_value(second.data).unwrap();
        assert_eq!(data.entity_id, "sensor.a");
        assert_eq!(data.old_state.unwrap().state, "1");
        assert_eq!(data.new_state.state, "2");
    }
}
