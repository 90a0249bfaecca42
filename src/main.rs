//! Forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──GET http://host/path──▶ ┌───────────────────────────┐ ──GET /path──▶ Origin
//!          ◀──────── response ────── │  mio event loop (1 thread)│ ◀── response ──
//!                                    │                           │
//!   Client ──CONNECT host:443──────▶ │  listener → connections   │ ──TCP─────────▶ Origin
//!          ◀── 200 established ───── │  (arena keyed by token)   │
//!          ◀═════ raw bytes ═══════▶ └───────────────────────────┘ ◀═══ raw bytes ═▶
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::observability::{logging, metrics};
use forward_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Single-threaded forward HTTP proxy (GET + CONNECT)", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen on this port, keeping the configured address.
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen on this address, e.g. 0.0.0.0:3128.
    #[arg(long, conflicts_with = "port")]
    bind: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        connect_timeout_ms = config.timeouts.connect_ms,
        initial_buffer = config.buffer.initial_capacity,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let server = ProxyServer::bind(config)?;
    if let Err(e) = server.run() {
        tracing::error!(error = %e, "Event loop terminated");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut ProxyConfig, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("127.0.0.1:{port}"),
        };
    }
}
