//! keepalive-probe: a liveness probe for long-running automation hosts.
//!
//! This is the application entry point. It loads configuration from TOML,
//! initializes tracing, builds the host services, registers the keepalive
//! probe, and serves `GET /healthz` until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keepalive_probe::clock::SystemClock;
use keepalive_probe::config::{AppConfig, LogFormat, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use keepalive_probe::host::{CoreState, Host};
use keepalive_probe::http::start_server;
use keepalive_probe::initialize;

/// keepalive-probe: report host liveness from a periodic keepalive
#[derive(Parser, Debug)]
#[command(name = "keepalive-probe", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "keepalive_probe=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first, the log format lives there
    let config = AppConfig::load(&args.config)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    match config.logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    tracing::info!(config = %args.config, "Loaded configuration");

    let host = Host::new(&config, Arc::new(SystemClock))?;
    host.lifecycle.set(CoreState::Starting);

    let handles = initialize(&host, &config)?;
    let tasks = host.start();
    tracing::info!(
        automations = host.automations.automations().len(),
        history = host.history.is_some(),
        "Host services started"
    );

    let served = start_server(handles.router(), &config.http, host.lifecycle.clone()).await;

    host.lifecycle.set(CoreState::Stopping);
    tasks.stop(&host);
    handles.unload(&host);
    host.lifecycle.set(CoreState::Stopped);

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
