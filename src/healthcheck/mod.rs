//! Keepalive health probe.
//!
//! `initialize` wires the probe into a host: it subscribes the recorder to
//! the keepalive event, makes sure an automation fires that event, and
//! builds the `/healthz` router around the evaluator. Everything it
//! registers comes back in `RegisteredHandles` so it can be torn down again.

pub mod evaluator;
pub mod recorder;
pub mod source;

use std::sync::Arc;

use axum::Router;

use crate::config::{
    AppConfig, AutomationConfig, ENTITY_NAME, EVENT_NAME, HEALTHCHECK_ENDPOINT,
    KEEPALIVE_INTERVAL_SECS,
};
use crate::host::{AutomationError, Host, ListenerHandle};
use crate::middleware::BearerTokens;
use crate::routes::create_router;
use crate::state::AppState;

pub use evaluator::{HealthEvaluator, HealthVerdict};
pub use recorder::KeepaliveRecorder;
pub use source::{select_source, HistorySource, LastSeenSource, LiveStateSource};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Failed to register keepalive automation: {0}")]
    Automation(#[from] AutomationError),
}

/// Everything `initialize` registered with the host
pub struct RegisteredHandles {
    router: Router,
    evaluator: Arc<HealthEvaluator>,
    recorder: KeepaliveRecorder,
    keepalive_listener: ListenerHandle,
    automation_id: Option<String>,
}

impl RegisteredHandles {
    /// Router serving the probe endpoint
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn evaluator(&self) -> &Arc<HealthEvaluator> {
        &self.evaluator
    }

    pub fn recorder(&self) -> &KeepaliveRecorder {
        &self.recorder
    }

    /// Id of the automation injected by `initialize`, if one was needed
    pub fn automation_id(&self) -> Option<&str> {
        self.automation_id.as_deref()
    }

    /// Undo every registration made by `initialize`
    pub fn unload(self, host: &Host) {
        self.keepalive_listener.remove();
        if let Some(id) = &self.automation_id {
            host.automations.remove(id);
        }
        tracing::info!("Keepalive probe unloaded");
    }
}

/// Register the keepalive probe with the host.
pub fn initialize(host: &Host, config: &AppConfig) -> Result<RegisteredHandles, SetupError> {
    let healthcheck = &config.healthcheck;
    let threshold_secs = healthcheck.threshold_secs();
    if threshold_secs <= KEEPALIVE_INTERVAL_SECS {
        tracing::warn!(
            threshold_secs,
            interval_secs = KEEPALIVE_INTERVAL_SECS,
            "Threshold does not exceed the keepalive interval, probe may flap"
        );
    }

    let recorder = KeepaliveRecorder::new(host.states.clone(), host.clock.clone(), ENTITY_NAME);
    let keepalive_listener = recorder.listen(&host.bus);

    let automation_id = if host.automations.fires(EVENT_NAME) {
        tracing::info!(event_type = EVENT_NAME, "Using configured keepalive automation");
        None
    } else {
        let automation = AutomationConfig::keepalive();
        let id = automation.id.clone();
        if let Err(e) = host.automations.register(automation) {
            keepalive_listener.remove();
            return Err(e.into());
        }
        Some(id)
    };

    let tokens = BearerTokens::new(&config.auth.tokens);
    if healthcheck.auth_required && tokens.is_empty() {
        tracing::warn!(
            "auth_required is set but no tokens are configured; every probe will be rejected"
        );
    }

    let evaluator = Arc::new(HealthEvaluator::new(host, ENTITY_NAME, threshold_secs));
    let state = AppState::new(evaluator.clone(), tokens);
    let router = create_router(state, healthcheck.auth_required);

    tracing::info!(
        endpoint = HEALTHCHECK_ENDPOINT,
        entity_id = ENTITY_NAME,
        threshold_secs,
        profile = ?healthcheck.profile,
        auth_required = healthcheck.auth_required,
        "Keepalive probe initialized"
    );

    Ok(RegisteredHandles {
        router,
        evaluator,
        recorder,
        keepalive_listener,
        automation_id,
    })
}
