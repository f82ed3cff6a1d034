//! Shared application state for request handlers.

use std::sync::Arc;

use crate::healthcheck::HealthEvaluator;
use crate::middleware::BearerTokens;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<HealthEvaluator>,
    pub tokens: Arc<BearerTokens>,
}

impl AppState {
    pub fn new(evaluator: Arc<HealthEvaluator>, tokens: BearerTokens) -> Self {
        Self {
            evaluator,
            tokens: Arc::new(tokens),
        }
    }
}
