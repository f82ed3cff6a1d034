//! Automation engine.
//!
//! Keeps the host's automation list and runs one interval task per
//! automation once started. Automations registered after `start` are
//! spawned immediately.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{ActionConfig, AutomationConfig, TriggerConfig};

use super::bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("Automation '{0}' is already registered")]
    Duplicate(String),
}

struct Registered {
    config: AutomationConfig,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct EngineState {
    automations: Vec<Registered>,
    started: bool,
}

/// Cloneable handle to the automation list and its running tasks
#[derive(Clone)]
pub struct AutomationEngine {
    bus: EventBus,
    state: Arc<Mutex<EngineState>>,
}

impl AutomationEngine {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an automation to the list, spawning it if the engine is running.
    pub fn register(&self, config: AutomationConfig) -> Result<(), AutomationError> {
        let mut state = self.lock();
        if state.automations.iter().any(|a| a.config.id == config.id) {
            return Err(AutomationError::Duplicate(config.id));
        }

        let task = state.started.then(|| self.spawn(&config));
        tracing::info!(
            id = %config.id,
            alias = config.alias.as_deref().unwrap_or(""),
            running = task.is_some(),
            "Automation registered"
        );
        state.automations.push(Registered { config, task });
        Ok(())
    }

    /// Stop and drop an automation. Returns false if the id is unknown.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.lock();
        let Some(index) = state.automations.iter().position(|a| a.config.id == id) else {
            return false;
        };
        let removed = state.automations.remove(index);
        if let Some(task) = removed.task {
            task.abort();
        }
        tracing::info!(id, "Automation removed");
        true
    }

    /// Snapshot of the automation list
    pub fn automations(&self) -> Vec<AutomationConfig> {
        self.lock().automations.iter().map(|a| a.config.clone()).collect()
    }

    /// Check if any automation fires the given event
    pub fn fires(&self, event_type: &str) -> bool {
        self.lock().automations.iter().any(|a| a.config.fires(event_type))
    }

    /// Spawn tasks for every registered automation
    pub fn start(&self) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;

        let mut spawned = 0;
        for index in 0..state.automations.len() {
            if state.automations[index].task.is_none() {
                let task = self.spawn(&state.automations[index].config);
                state.automations[index].task = Some(task);
                spawned += 1;
            }
        }
        tracing::info!(count = spawned, "Started automations");
    }

    /// Abort every running automation task
    pub fn stop(&self) {
        let mut state = self.lock();
        state.started = false;
        for automation in state.automations.iter_mut() {
            if let Some(task) = automation.task.take() {
                task.abort();
            }
        }
        tracing::info!("Stopped automations");
    }

    fn spawn(&self, config: &AutomationConfig) -> JoinHandle<()> {
        let TriggerConfig::TimePattern { seconds } = config.trigger;
        let ActionConfig::FireEvent { event_type } = config.action.clone();
        let id = config.id.clone();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            // First tick completes immediately
            let mut interval = tokio::time::interval(Duration::from_secs(seconds.get()));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tracing::trace!(automation = %id, event_type = %event_type, "Automation triggered");
                bus.fire(&event_type, serde_json::Value::Null);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::num::NonZeroU64;

    fn automation(id: &str, event_type: &str) -> AutomationConfig {
        AutomationConfig {
            id: id.to_string(),
            alias: None,
            trigger: TriggerConfig::TimePattern {
                seconds: NonZeroU64::new(1).unwrap(),
            },
            action: ActionConfig::FireEvent {
                event_type: event_type.to_string(),
            },
        }
    }

    fn engine() -> (AutomationEngine, EventBus) {
        let bus = EventBus::new(16, Arc::new(SystemClock));
        (AutomationEngine::new(bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_ids() {
        let (engine, _) = engine();
        engine.register(automation("a", "x")).unwrap();
        let err = engine.register(automation("a", "y")).unwrap_err();
        assert!(matches!(err, AutomationError::Duplicate(id) if id == "a"));
        assert_eq!(engine.automations().len(), 1);
    }

    #[tokio::test]
    async fn test_fires_and_remove() {
        let (engine, _) = engine();
        engine.register(automation("a", "x")).unwrap();
        assert!(engine.fires("x"));
        assert!(!engine.fires("y"));

        assert!(engine.remove("a"));
        assert!(!engine.remove("a"));
        assert!(!engine.fires("x"));
    }

    #[tokio::test]
    async fn test_started_engine_fires_events() {
        let (engine, bus) = engine();
        let mut events = bus.subscribe();
        engine.register(automation("a", "tick")).unwrap();
        engine.start();

        // Interval's first tick is immediate
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, "tick");
        engine.stop();
    }

    #[tokio::test]
    async fn test_register_after_start_spawns_immediately() {
        let (engine, bus) = engine();
        let mut events = bus.subscribe();
        engine.start();
        engine.register(automation("late", "late_tick")).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, "late_tick");
        engine.stop();
    }
}
