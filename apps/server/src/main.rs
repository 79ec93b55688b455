//! Homeboard Server - Standalone headless server for the Homeboard dashboard.
//!
//! This binary connects to the home-automation hub, runs the panel
//! controllers and serves render models to browser renderers over HTTP and
//! WebSocket. It is designed to run as a background daemon next to the wall
//! display.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use homeboard_core::{bind_listener, bootstrap_dashboard, serve, LoggingEventEmitter};
use tokio::signal;

use crate::config::ServerConfig;

/// Homeboard Server - Headless home-automation dashboard backend.
#[derive(Parser, Debug)]
#[command(name = "homeboard-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "HOMEBOARD_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "HOMEBOARD_BIND_PORT")]
    port: Option<u16>,

    /// Hub base URL (overrides config file).
    #[arg(long, env = "HOMEBOARD_HUB_URL")]
    hub_url: Option<String>,

    /// Hub access token (overrides config file).
    #[arg(long, env = "HOMEBOARD_HUB_TOKEN", hide_env_values = true)]
    hub_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Homeboard Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = ServerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .into_core_config();

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.preferred_port = port;
    }
    if let Some(url) = args.hub_url {
        config.hub.url = url;
    }
    if let Some(token) = args.hub_token {
        config.hub.token = token;
    }

    log::info!(
        "Configuration: preferred_port={}, hub={}, views={:?}, feeds={}",
        config.preferred_port,
        if config.hub.enabled {
            config.hub.url.as_str()
        } else {
            "disabled"
        },
        config.views.available,
        config.feeds.len()
    );

    let dashboard = bootstrap_dashboard(&config).context("Failed to bootstrap dashboard")?;
    log::info!("Dashboard bootstrapped successfully");

    if args.log_level >= log::LevelFilter::Debug {
        dashboard
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    dashboard.start_background_tasks();

    let (port, listener) = bind_listener(config.preferred_port)
        .await
        .context("Failed to bind HTTP server")?;
    log::info!("HTTP server bound on port {}", port);

    // Browser sessions are upgraded connections, so they are closed explicitly
    // before the server waits for in-flight requests.
    let ws_manager = Arc::clone(&dashboard.ws_manager);
    let shutdown = async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, cleaning up...");
        ws_manager.close_all();
    };

    let served = serve(listener, dashboard.app_state(), shutdown).await;

    // Graceful shutdown
    dashboard.shutdown();

    served.context("HTTP server failed")?;
    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
