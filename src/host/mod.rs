//! In-process host collaborators.
//!
//! The probe only talks to these through narrow contracts: lifecycle state,
//! an event bus, a live state store, an optional persisted history, and the
//! automation list that drives the keepalive tick.

pub mod automation;
pub mod bus;
pub mod history;
pub mod lifecycle;
pub mod states;

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{AppConfig, EVENT_BUS_CAPACITY};
use crate::error::StoreError;

pub use automation::{AutomationEngine, AutomationError};
pub use bus::{Event, EventBus, ListenerHandle};
pub use history::HistoryStore;
pub use lifecycle::{CoreState, Lifecycle};
pub use states::{StateRecord, StateStore};

/// Host services shared with integrations.
#[derive(Clone)]
pub struct Host {
    pub lifecycle: Lifecycle,
    pub bus: EventBus,
    pub states: StateStore,
    pub history: Option<HistoryStore>,
    pub automations: AutomationEngine,
    pub clock: Arc<dyn Clock>,
}

impl Host {
    /// Build the host from configuration.
    ///
    /// Opens the history file when enabled and loads the configured
    /// automations. Nothing runs until `start`.
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, HostError> {
        let bus = EventBus::new(EVENT_BUS_CAPACITY, clock.clone());
        let states = StateStore::new(bus.clone(), clock.clone());

        let history = if config.history.enabled {
            let store = HistoryStore::open(&config.history)?;
            tracing::info!(path = %store.path().display(), "State history enabled");
            Some(store)
        } else {
            None
        };

        let automations = AutomationEngine::new(bus.clone());
        for automation in &config.automation {
            automations.register(automation.clone())?;
        }

        Ok(Self {
            lifecycle: Lifecycle::new(),
            bus,
            states,
            history,
            automations,
            clock,
        })
    }

    /// Start background services: the history writer and the automations.
    pub fn start(&self) -> HostTasks {
        let history_writer = self.history.as_ref().map(|h| h.spawn_writer(&self.bus));
        self.automations.start();
        HostTasks { history_writer }
    }
}

/// Background tasks owned by a started host
pub struct HostTasks {
    history_writer: Option<ListenerHandle>,
}

impl HostTasks {
    pub fn stop(self, host: &Host) {
        host.automations.stop();
        if let Some(writer) = self.history_writer {
            writer.remove();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to open state history: {0}")]
    History(#[from] StoreError),
    #[error(transparent)]
    Automation(#[from] AutomationError),
}
