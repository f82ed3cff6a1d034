//! Where the evaluator reads the last keepalive from.
//!
//! Two backends sit behind one trait: the live state store and the persisted
//! history. `select_source` picks one per call. Once history tracks the
//! entity it is trusted exclusively; an empty history is not patched up from
//! the live store.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::host::{HistoryStore, StateRecord, StateStore};

/// A backend that can report the latest state of an entity
#[async_trait]
pub trait LastSeenSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Latest recorded state, or `None` if the backend has nothing
    async fn last_seen(&self, entity_id: &str) -> Result<Option<StateRecord>, StoreError>;
}

/// Reads the current value from the live state store
pub struct LiveStateSource {
    states: StateStore,
}

impl LiveStateSource {
    pub fn new(states: StateStore) -> Self {
        Self { states }
    }
}

#[async_trait]
impl LastSeenSource for LiveStateSource {
    fn name(&self) -> &'static str {
        "states"
    }

    async fn last_seen(&self, entity_id: &str) -> Result<Option<StateRecord>, StoreError> {
        tracing::debug!(entity_id, "Fetching last keepalive from live states");
        Ok(self.states.get(entity_id).await)
    }
}

/// Reads the most recent persisted value (limit 1) on the blocking pool
pub struct HistorySource {
    history: HistoryStore,
}

impl HistorySource {
    pub fn new(history: HistoryStore) -> Self {
        Self { history }
    }
}

#[async_trait]
impl LastSeenSource for HistorySource {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn last_seen(&self, entity_id: &str) -> Result<Option<StateRecord>, StoreError> {
        tracing::debug!(entity_id, "Fetching last keepalive from history");
        let last = self.history.last_states_async(entity_id, 1).await?.pop();
        if last.is_none() {
            tracing::warn!(entity_id, "Unable to fetch last keepalive from history");
        }
        Ok(last)
    }
}

/// Pick the backend for `entity_id`: history when it tracks the entity,
/// live states otherwise.
pub fn select_source(
    states: &StateStore,
    history: Option<&HistoryStore>,
    entity_id: &str,
) -> Box<dyn LastSeenSource> {
    match history {
        Some(history) if history.is_entity_tracked(entity_id) => {
            Box::new(HistorySource::new(history.clone()))
        }
        _ => Box::new(LiveStateSource::new(states.clone())),
    }
}
