//! Pump Reader Daemon
//!
//! Polls the vacuum system sensors and serves their latest readings
//! over a JSON API.

mod config;
#[cfg(feature = "gpio")]
mod gpio;
mod registry;
mod web;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);

    // Ready pin low while pollers come up
    #[cfg(feature = "gpio")]
    let mut ready_pin = config
        .gpio
        .ready_pin
        .map(gpio::ReadyPin::new)
        .transpose()
        .context("Failed to claim ready pin")?;

    // Open every configured device and start its polling task
    let registry = Arc::new(Registry::new(&config)?);
    info!("Pump reader ready");

    #[cfg(feature = "gpio")]
    if let Some(pin) = ready_pin.as_mut() {
        pin.set_ready();
    }

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let app = web::create_router(registry.clone());
    let addr: SocketAddr = config.web.listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    registry.shutdown().await;
    info!("Pump reader stopped");

    Ok(())
}
