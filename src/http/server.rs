//! HTTP server startup logic.

use std::net::SocketAddr;

use axum::Router;
use axum_server::Handle;

use crate::config::HttpServerConfig;
use crate::host::{CoreState, Lifecycle};

use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid http.host or http.port: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Start the HTTP server and serve `app` until a shutdown signal arrives.
///
/// The lifecycle moves to `running` once the listener is bound, and to
/// `stopping` when a shutdown signal is received.
pub async fn start_server(
    app: Router,
    config: &HttpServerConfig,
    lifecycle: Lifecycle,
) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let handle = Handle::new();

    // Setup graceful shutdown
    shutdown::setup_shutdown_handler(handle.clone(), lifecycle.clone());

    spawn_ready_watcher(handle.clone(), lifecycle);

    tracing::info!(%addr, "Starting HTTP server");

    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Marks the host as running as soon as the listener accepts connections.
fn spawn_ready_watcher(handle: Handle, lifecycle: Lifecycle) {
    tokio::spawn(async move {
        match handle.listening().await {
            Some(addr) => {
                tracing::info!(%addr, "Listening for probe requests");
                lifecycle.set(CoreState::Running);
            }
            None => {
                tracing::warn!("Server stopped before it started listening");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let config = HttpServerConfig {
            host: "not an address".to_string(),
            port: 8123,
        };

        let result = start_server(Router::new(), &config, Lifecycle::new()).await;
        assert!(matches!(result, Err(ServerError::Address(_))));
    }
}
