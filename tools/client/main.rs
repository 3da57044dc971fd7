//! Test client for frame_relay
//!
//! Speaks both sides of the relay from the command line:
//!
//! ```bash
//! # Upload a JPEG as device 3 (capture time defaults to now)
//! relay_client send frame.jpg --device-id 3
//!
//! # Fetch the latest detection summary / raw frame
//! relay_client fetch /detection
//! relay_client fetch /raw -o latest.jpg
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use frame_relay::network::client::{fetch, send_frame};
use frame_relay::network::HeaderLayout;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relay_client")]
#[command(about = "Upload frames to and fetch results from a frame relay", long_about = None)]
struct Cli {
    /// Relay host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    host: String,

    /// Relay port
    #[arg(long, default_value = "10086", global = true)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a JPEG file as one device frame
    Send {
        /// JPEG file to upload
        file: PathBuf,

        /// Device identifier
        #[arg(long, default_value = "1")]
        device_id: u32,

        /// Capture time in seconds since the epoch (default: now)
        #[arg(long)]
        capture_time: Option<f64>,

        /// Header layout the relay expects
        #[arg(long, default_value = "packed")]
        layout: HeaderLayout,
    },

    /// GET a path and print or save the body
    Fetch {
        /// Request path (/, /raw, /detection)
        #[arg(default_value = "/")]
        path: String,

        /// Write the body to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    match cli.command {
        Commands::Send {
            file,
            device_id,
            capture_time,
            layout,
        } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let capture_time = capture_time.unwrap_or_else(now_seconds);

            send_frame(addr.as_str(), device_id, capture_time, &payload, layout).await?;
            println!(
                "Sent {} bytes as device {} at t={:.3}",
                payload.len(),
                device_id,
                capture_time
            );
            Ok(())
        }
        Commands::Fetch { path, output } => {
            let response = fetch(addr.as_str(), &path).await?;
            if response.status != 200 {
                bail!(
                    "{} returned {}: {}",
                    path,
                    response.status,
                    String::from_utf8_lossy(&response.body)
                );
            }

            match output {
                Some(out) => {
                    tokio::fs::write(&out, &response.body)
                        .await
                        .with_context(|| format!("writing {}", out.display()))?;
                    println!(
                        "Saved {} bytes from device {} to {}",
                        response.body.len(),
                        response.header("X-Device-Id").unwrap_or("?"),
                        out.display()
                    );
                }
                None => {
                    std::io::stdout().write_all(&response.body)?;
                    println!();
                }
            }
            Ok(())
        }
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
