//! Health evaluation.
//!
//! Turns the last recorded keepalive into a verdict. Any failure along the
//! way reads as "no keepalive seen", which is unhealthy: an orchestrator has
//! no use for telling "unknown" apart from "down".

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::host::{CoreState, HistoryStore, Host, Lifecycle, StateStore};

use super::source::select_source;

/// Response body of the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthVerdict {
    pub healthy: bool,
}

impl HealthVerdict {
    pub const HEALTHY: Self = Self { healthy: true };
    pub const UNHEALTHY: Self = Self { healthy: false };

    pub fn status_code(&self) -> StatusCode {
        if self.healthy {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Parse a recorded keepalive state into whole epoch seconds.
///
/// Integers are taken as-is; fractional values are floored.
pub fn parse_timestamp(state: &str) -> Option<i64> {
    let state = state.trim();
    if let Ok(secs) = state.parse::<i64>() {
        return Some(secs);
    }
    let secs = state.parse::<f64>().ok()?.floor();
    if secs.is_finite() && secs >= i64::MIN as f64 && secs <= i64::MAX as f64 {
        Some(secs as i64)
    } else {
        None
    }
}

/// Whole seconds between `last_seen` and `now`.
///
/// A keepalive stamped in the future (clock skew) counts as just seen.
pub fn elapsed_secs(now: DateTime<Utc>, last_seen: i64) -> u64 {
    let elapsed = now.timestamp().saturating_sub(last_seen);
    if elapsed < 0 {
        tracing::warn!(
            last_seen,
            now = now.timestamp(),
            "Last keepalive is in the future, treating as just seen"
        );
    }
    elapsed.max(0) as u64
}

pub struct HealthEvaluator {
    lifecycle: Lifecycle,
    states: StateStore,
    history: Option<HistoryStore>,
    clock: Arc<dyn Clock>,
    threshold_secs: u64,
    entity_id: String,
}

impl HealthEvaluator {
    pub fn new(host: &Host, entity_id: impl Into<String>, threshold_secs: u64) -> Self {
        Self {
            lifecycle: host.lifecycle.clone(),
            states: host.states.clone(),
            history: host.history.clone(),
            clock: host.clock.clone(),
            threshold_secs,
            entity_id: entity_id.into(),
        }
    }

    pub fn threshold_secs(&self) -> u64 {
        self.threshold_secs
    }

    /// Decide whether the host is healthy right now. Never fails.
    pub async fn evaluate(&self) -> HealthVerdict {
        let state = self.lifecycle.state();
        if state != CoreState::Running {
            tracing::info!(state = %state, "Host is not running, reporting as healthy");
            return HealthVerdict::HEALTHY;
        }

        let source = select_source(&self.states, self.history.as_ref(), &self.entity_id);
        let last_seen = match source.last_seen(&self.entity_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    source = source.name(),
                    entity_id = %self.entity_id,
                    error = %e,
                    "Failed to read last keepalive"
                );
                None
            }
        };

        let last_seen = last_seen.and_then(|record| {
            let parsed = parse_timestamp(&record.state);
            if parsed.is_none() {
                tracing::warn!(
                    entity_id = %self.entity_id,
                    state = %record.state,
                    "Last keepalive is not a timestamp"
                );
            }
            parsed
        });

        let Some(last_seen) = last_seen else {
            tracing::error!(
                source = source.name(),
                "Host is unhealthy, unknown keepalive last seen"
            );
            return HealthVerdict::UNHEALTHY;
        };

        let elapsed = elapsed_secs(self.clock.now(), last_seen);
        if elapsed < self.threshold_secs {
            tracing::debug!(
                elapsed_secs = elapsed,
                threshold_secs = self.threshold_secs,
                "Host is healthy, last keepalive observed {} seconds ago",
                elapsed
            );
            HealthVerdict::HEALTHY
        } else {
            tracing::error!(
                elapsed_secs = elapsed,
                threshold_secs = self.threshold_secs,
                "Host is unhealthy, last keepalive observed {} seconds ago",
                elapsed
            );
            HealthVerdict::UNHEALTHY
        }
    }
}
