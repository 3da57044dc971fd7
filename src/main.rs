//! CLI Entry Point for frame_relay
//!
//! Starts the relay: one TCP port that takes device uploads and answers
//! HTTP GETs for the latest published frame.
//!
//! # Usage
//!
//! ```bash
//! frame_relay --port 10086 --detector motion
//! frame_relay --config config/frame_relay.toml --log-level debug
//! ```
//!
//! Settings resolve in this order (later wins): built-in defaults, the TOML
//! file, `FRAME_RELAY_*` environment variables, command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use frame_relay::config::{DetectorBackend, RelayConfig};
use frame_relay::logging;
use frame_relay::network::{HeaderLayout, RelayServer};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "frame_relay")]
#[command(about = "Camera frame relay with motion detection and HTTP read-back", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/frame_relay.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long, short)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for the per-device upload files
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Detection backend (motion, passthrough)
    #[arg(long)]
    detector: Option<DetectorBackend>,

    /// Upload header layout (packed, native)
    #[arg(long)]
    header_layout: Option<HeaderLayout>,
}

impl Cli {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(dir) = self.upload_dir {
            config.upload.dir = dir;
        }
        if let Some(backend) = self.detector {
            config.detection.backend = backend;
        }
        if let Some(layout) = self.header_layout {
            config.protocol.header_layout = layout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RelayConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);
    config.validate().context("validating configuration")?;

    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    info!(
        addr = %config.server.bind_addr(),
        detector = ?config.detection.backend,
        "Starting frame relay"
    );

    let server = RelayServer::from_config(&config)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr()))?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Frame relay stopped");
    Ok(())
}
