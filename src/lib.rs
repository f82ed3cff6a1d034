//! keepalive-probe - liveness probe for long-running automation hosts
//!
//! A scheduler fires a keepalive event every few seconds; the recorder
//! stamps the time into an entity, and `GET /healthz` reports whether that
//! stamp is fresh enough.

pub mod clock;
pub mod config;
pub mod error;
pub mod healthcheck;
pub mod host;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::*;
pub use healthcheck::{initialize, RegisteredHandles};
