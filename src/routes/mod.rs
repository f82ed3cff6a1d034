//! HTTP routes.
//!
//! The only route is the health probe. Authentication is layered onto it
//! when `auth_required` is set; request tracing wraps everything.

pub mod health;

use axum::http::header::{HeaderValue, CACHE_CONTROL};
use axum::{middleware, routing::get, Router};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CACHE_CONTROL_PROBE, HEALTHCHECK_ENDPOINT};
use crate::middleware::{request_id_layer, require_bearer_token};
use crate::state::AppState;

/// Creates the Axum router for the probe endpoint.
pub fn create_router(state: AppState, auth_required: bool) -> Router {
    let mut health_routes: Router<AppState> =
        Router::new().route(HEALTHCHECK_ENDPOINT, get(health::healthz));

    if auth_required {
        health_routes = health_routes.route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_token,
        ));
    }

    health_routes
        // No caching, always fresh for liveness probes
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_PROBE),
        ))
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
