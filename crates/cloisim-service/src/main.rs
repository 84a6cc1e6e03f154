//! # cloisim-service
//!
//! CLOiSim control service binary. Loads settings, seeds the bridge
//! registry from an optional device manifest, runs the reset loop and serves
//! the `/control` WebSocket until Ctrl-C.

#![deny(unsafe_code)]

mod manifest;
mod reset_loop;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cloisim_core::{BridgeManager, ResetLatch};
use cloisim_logging::LogOptions;
use cloisim_server::{CONTROL_PATH, ControlServer, ServerConfig};
use cloisim_settings::{LoggingSettings, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// How long shutdown waits for open sessions.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// CLOiSim control service.
#[derive(Parser, Debug)]
#[command(name = "cloisim-service", about = "CLOiSim simulation control service")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `CLOISIM_SERVICE_PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.cloisim/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON array of device bindings to allocate at startup.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Reset loop polling interval in milliseconds.
    #[arg(long, default_value = "100")]
    reset_tick_ms: u64,
}

impl Cli {
    fn server_config(&self, base: ServerConfig) -> ServerConfig {
        ServerConfig {
            host: self.host.clone().unwrap_or(base.host),
            port: self.port.unwrap_or(base.port),
            ..base
        }
    }
}

fn log_options(logging: &LoggingSettings) -> LogOptions {
    LogOptions {
        level: logging.level.as_filter_str().to_string(),
        transport_level: logging.transport_level.as_filter_str().to_string(),
        json: logging.json,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings: {}", path.display()))?;
    let _ = cloisim_logging::init_subscriber(&log_options(&settings.logging));
    info!(path = %path.display(), version = %settings.version, "settings loaded");

    let config = cli.server_config(ServerConfig::from(&settings.server));
    if cloisim_settings::init_settings(settings).is_err() {
        warn!("global settings already initialized");
    }

    let metrics = cloisim_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let bridges = Arc::new(BridgeManager::new());
    if let Some(manifest_path) = &cli.manifest {
        let bindings = manifest::load(manifest_path)?;
        let allocated = manifest::seed(&bridges, &bindings);
        info!(allocated, total = bindings.len(), "device manifest applied");
    }

    let latch = Arc::new(ResetLatch::new());
    let server = ControlServer::new(config, bridges, latch.clone(), metrics);
    let (addr, serve) = server
        .listen()
        .await
        .context("Failed to start control server")?;
    info!(port = addr.port(), paths = ?[CONTROL_PATH], "CLOiSim control service ready");

    let reset_task = tokio::spawn(reset_loop::run(
        latch,
        Duration::from_millis(cli.reset_tick_ms.max(1)),
        server.shutdown_token(),
        || info!("resetting simulation"),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutting down");

    if !server.stop(serve, SHUTDOWN_TIMEOUT).await {
        warn!("forcing exit with sessions still open");
    }
    let resets = reset_task.await.unwrap_or_default();
    info!(resets, "control service stopped");
    Ok(())
}
