//! cardlinkd - NFC access-card relay daemon
//!
//! Binds the bridge-facing and frontend-facing endpoints and relays card
//! events and commands between them until interrupted.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardlink_core::constants::{DEFAULT_BRIDGE_PORT, DEFAULT_FRONTEND_PORT};
use cardlink_relay::relay::RelayConfig;
use cardlink_relay::{RelayServer, RelayServerConfig};

#[derive(Parser)]
#[command(name = "cardlinkd")]
#[command(about = "NFC access-card relay between hardware bridges and frontends")]
#[command(version)]
struct Args {
    /// Bind address for the bridge-facing endpoint
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_BRIDGE_PORT)))]
    bridge_addr: SocketAddr,

    /// Bind address for the frontend-facing endpoint
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_FRONTEND_PORT)))]
    frontend_addr: SocketAddr,

    /// Deadline for correlated bridge requests, in milliseconds
    #[arg(long, default_value_t = cardlink_core::constants::DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(version = cardlink_core::VERSION, "starting cardlinkd");

    let server = RelayServer::bind(RelayServerConfig {
        bridge_addr: args.bridge_addr,
        frontend_addr: args.frontend_addr,
        relay: RelayConfig {
            request_timeout: Duration::from_millis(args.request_timeout_ms),
        },
    })
    .await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
