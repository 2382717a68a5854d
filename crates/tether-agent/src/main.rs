//! # tether-agent
//!
//! Tether server binary: loads settings, installs logging and metrics, and
//! serves the session-group multiplexer until Ctrl-C.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_server::access::AccessGate;
use tether_server::config::ServerConfig;
use tether_server::registry::SessionRegistry;
use tether_server::server::TetherServer;
use tether_settings::TetherSettings;
use tether_upstream::SessionFactory;
use tether_upstream::simulated::{SimulatedConfig, SimulatedFactory};

/// Tether session-group server.
#[derive(Parser, Debug)]
#[command(name = "tether-agent", about = "Share upstream sessions across WebSocket clients")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Enable access control with this allow-list file.
    #[arg(long)]
    access_list: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut TetherSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.access_list {
            settings.access.enabled = true;
            settings.access.allow_list_path = Some(path.clone());
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn simulated_config(settings: &TetherSettings) -> SimulatedConfig {
    SimulatedConfig {
        ready_delay: Duration::from_millis(settings.upstream.ready_delay_ms),
        event_interval: Duration::from_millis(settings.upstream.event_interval_ms.max(1)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(tether_settings::settings_path);
    let mut settings = tether_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    logging::init(&settings.logging).context("Failed to initialize logging")?;

    let metrics_handle =
        tether_server::metrics::install_recorder().context("Failed to install metrics")?;

    let gate = AccessGate::from_settings(&settings.access);
    if gate.is_enabled() {
        tracing::info!(allow_list = ?gate.allow_list(), "access control enabled");
    }
    let factory: Arc<dyn SessionFactory> =
        Arc::new(SimulatedFactory::new(simulated_config(&settings)));
    let registry = Arc::new(SessionRegistry::new(factory, gate));

    let server = TetherServer::new(ServerConfig::from(&settings), registry)
        .with_metrics(metrics_handle);
    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Tether listening on http://{}", handle.addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(handle, None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
