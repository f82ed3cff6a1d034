//! HTTP server module.
//!
//! Serves the probe router over plain HTTP. TLS is expected to be
//! terminated in front of the host, if at all.
//!
//! The server includes:
//! - Lifecycle promotion to `running` once the listener is bound
//! - Graceful shutdown on SIGTERM/SIGINT

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
