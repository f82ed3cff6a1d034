//! Host lifecycle tracking.
//!
//! `main` advances the state as the process boots and shuts down; the
//! evaluator reads it to decide whether the keepalive check applies yet.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where the host is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreState {
    NotRunning = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl CoreState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CoreState::Starting,
            2 => CoreState::Running,
            3 => CoreState::Stopping,
            4 => CoreState::Stopped,
            _ => CoreState::NotRunning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreState::NotRunning => "not_running",
            CoreState::Starting => "starting",
            CoreState::Running => "running",
            CoreState::Stopping => "stopping",
            CoreState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared lifecycle state, cloned into every component that needs it
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Lifecycle {
    /// Create a new lifecycle (initially not running)
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CoreState::NotRunning as u8)),
        }
    }

    pub fn state(&self) -> CoreState {
        CoreState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: CoreState) {
        let previous = CoreState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            tracing::info!(from = %previous, to = %state, "Host lifecycle changed");
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
