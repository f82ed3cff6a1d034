//! Health check endpoint for container orchestration.
//!
//! Reports whether the host has produced a keepalive recently enough.
//! 200 with `{"healthy": true}` when it has, 500 with `{"healthy": false}`
//! otherwise.

use axum::{extract::State, http::StatusCode, Json};

use crate::healthcheck::HealthVerdict;
use crate::state::AppState;

/// Health check handler.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthVerdict>) {
    let verdict = state.evaluator.evaluate().await;
    (verdict.status_code(), Json(verdict))
}
