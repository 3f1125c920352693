//! Socket bridge (v1)
//!
//! Carries raw TCP over WebSocket upgrades.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐  TCP   ┌─────────────┐ WebSocket ┌──────────────┐  TCP   ┌─────────────┐
//!   │ local client │──────▶│  forwarder  │──────────▶│ upgrade      │──────▶│ destination │
//!   └──────────────┘        │ (client)    │           │ server       │        └─────────────┘
//!                           └─────────────┘           │  keepalive   │
//!                                                     │  preamble?   │
//!                                                     │  bridge      │
//!                                                     └──────────────┘
//! ```
//!
//! `serve` runs the upgrade server, `forward` runs the client side.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use socket_bridge::config::{load_config, validate_config, BridgeConfig, ConfigError};
use socket_bridge::lifecycle::{signals, Shutdown};
use socket_bridge::net::TungsteniteDialler;
use socket_bridge::observability::{logging, metrics};
use socket_bridge::stream::{BridgeHandler, PreambleHandler, StreamHandler};
use socket_bridge::{BridgeServer, Forwarder};

/// How long running sessions get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "socket-bridge")]
#[command(about = "Bridge raw TCP connections over WebSocket upgrades", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept upgrade requests and bridge them to TCP backends
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Static final destination (host:port); otherwise read from the routing header
        #[arg(long)]
        destination: Option<String>,
        /// Send a destination/token preamble to the backend before bridging
        #[arg(long)]
        preamble: bool,
    },
    /// Accept local TCP clients and forward them over WebSocket upgrades
    Forward {
        /// Local address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Upgrade endpoint (http, https, ws or wss)
        #[arg(long)]
        url: Option<String>,
        /// Final destination announced through the routing header
        #[arg(long)]
        destination: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    apply_overrides(&mut config, &cli.command);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_filter);
    tracing::info!("socket-bridge v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(Arc::clone(&shutdown));

    match cli.command {
        Commands::Serve { .. } => {
            if config.preamble.enabled {
                let handler = PreambleHandler::new(
                    HeaderName::from_bytes(config.destination.routing_header.as_bytes())?,
                    HeaderName::from_bytes(config.preamble.token_header.as_bytes())?,
                );
                serve(&config, handler, &shutdown).await?;
            } else {
                serve(&config, BridgeHandler, &shutdown).await?;
            }
        }
        Commands::Forward { .. } => forward(&config, &shutdown).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut BridgeConfig, command: &Commands) {
    match command {
        Commands::Serve {
            bind,
            destination,
            preamble,
        } => {
            if let Some(bind) = bind {
                config.listener.bind_address = bind.clone();
            }
            if destination.is_some() {
                config.destination.static_destination = destination.clone();
            }
            if *preamble {
                config.preamble.enabled = true;
            }
        }
        Commands::Forward { bind, url, destination } => {
            if let Some(bind) = bind {
                config.forwarder.bind_address = bind.clone();
            }
            if url.is_some() {
                config.forwarder.url = url.clone();
            }
            if destination.is_some() {
                config.forwarder.destination = destination.clone();
            }
        }
    }
}

async fn serve<H: StreamHandler>(
    config: &BridgeConfig,
    handler: H,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        static_destination = ?config.destination.static_destination,
        pong_wait_secs = config.keepalive.pong_wait_secs,
        preamble = config.preamble.enabled,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = BridgeServer::new(config, handler)?;
    let sessions = server.sessions();

    server.run(listener, shutdown.subscribe()).await?;
    if !shutdown.is_triggered() {
        tracing::warn!("Upgrade server stopped without a shutdown request");
    }

    if !sessions.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!(active_sessions = sessions.active_count(), "Sessions still running at exit");
    }
    Ok(())
}

async fn forward(config: &BridgeConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = config.forwarder.url.as_deref() else {
        return Err("forward requires --url or forwarder.url".into());
    };
    let url = url::Url::parse(url)?;

    let mut forwarder = Forwarder::new(url, TungsteniteDialler::default(), config.keepalive.timeouts());
    if let Some(destination) = &config.forwarder.destination {
        forwarder = forwarder.with_destination(
            HeaderName::from_bytes(config.destination.routing_header.as_bytes())?,
            HeaderValue::from_str(destination)?,
        );
    }
    let sessions = forwarder.sessions();

    let listener = TcpListener::bind(&config.forwarder.bind_address).await?;
    forwarder.run(listener, shutdown.subscribe()).await?;
    if !shutdown.is_triggered() {
        tracing::warn!("Forwarder stopped without a shutdown request");
    }

    if !sessions.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!(active_sessions = sessions.active_count(), "Sessions still running at exit");
    }
    Ok(())
}
