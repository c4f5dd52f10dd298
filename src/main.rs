//! hashring-proxy node
//!
//! Routes every HTTP request to the one cluster member that owns its client
//! key on a consistent hash ring.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────── node A ───────────────────────┐
//!   Client ───────▶│ http server → key → membership lookup                 │
//!                  │      │ owner == A            │ owner == B             │
//!                  │      ▼                       ▼                        │
//!                  │   backend              forwarder → transport ─────────┼──┐
//!                  └───────────────────────────────────────────────────────┘  │
//!                  ┌──────────────────────── node B ───────────────────────┐  │
//!                  │ ring server → peer receiver → backend → recorder ◀────┼──┘
//!                  └───────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use hashring_proxy::config::{loader, NodeConfig};
use hashring_proxy::discovery::{HostsFileWatcher, ProviderBuilder};
use hashring_proxy::lifecycle::{self, signals, Shutdown};
use hashring_proxy::observability::{logging, metrics as node_metrics};

#[derive(Parser, Debug)]
#[command(name = "hashring-proxy")]
#[command(about = "Consistent-hash HTTP request router", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client-facing listen address.
    #[arg(long = "listen.http")]
    listen_http: Option<String>,

    /// Ring listen address.
    #[arg(long = "listen.ringpop")]
    listen_ringpop: Option<String>,

    /// Debug listen address.
    #[arg(long = "listen.debug")]
    listen_debug: Option<String>,

    /// Backend base URL.
    #[arg(long = "backend.url")]
    backend_url: Option<String>,

    /// Log level.
    #[arg(long = "log.level")]
    log_level: Option<String>,

    /// JSON file with the member list.
    #[arg(long = "discovery.json.file")]
    discovery_json_file: Option<String>,

    /// Hostname resolving to all members.
    #[arg(long = "discovery.dns.host")]
    discovery_dns_host: Option<String>,

    /// Ring port appended to DNS results.
    #[arg(long = "discovery.dns.port")]
    discovery_dns_port: Option<u16>,

    /// Address other nodes reach this node on.
    #[arg(long = "peer.ip", env = "RINGPOP_PEER_IP")]
    peer_ip: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(v) = self.listen_http {
            config.listener.bind_address = v;
        }
        if let Some(v) = self.listen_ringpop {
            config.ring.listen_address = v;
        }
        if let Some(v) = self.listen_debug {
            config.observability.debug_address = v;
        }
        if let Some(v) = self.backend_url {
            config.backend.url = v;
        }
        if let Some(v) = self.log_level {
            config.observability.log_level = v;
        }
        if let Some(v) = self.discovery_json_file {
            config.discovery.json_file = Some(v);
        }
        if let Some(v) = self.discovery_dns_host {
            config.discovery.dns_host = Some(v);
        }
        if let Some(v) = self.discovery_dns_port {
            config.discovery.dns_port = v;
        }
        if let Some(v) = self.peer_ip {
            config.ring.peer_ip = Some(v);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => loader::read_config(&path)?,
        None => NodeConfig::default(),
    };
    cli.apply(&mut config);
    loader::validate(&config)?;

    logging::init_logging(&config.observability.log_level)?;

    tracing::info!("hashring-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        ring_address = %config.ring.listen_address,
        backend = %config.backend.url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let prometheus = if config.observability.metrics_enabled {
        match node_metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let provider = ProviderBuilder::from_config(&config.discovery).build()?;

    let shutdown = Shutdown::new();
    let mut node = lifecycle::start(&config, &shutdown, prometheus).await?;

    let members = node.bootstrap(provider.as_ref()).await?;
    tracing::info!(identity = %node.identity, members = members.len(), "Node ready");

    // The watcher handle must outlive the refresh loop.
    let (_watcher, updates) = match config.discovery.json_file.as_deref() {
        Some(path) if config.discovery.watch_file => {
            let (watcher, rx) = HostsFileWatcher::new(Path::new(path));
            match watcher.run() {
                Ok(handle) => (Some(handle), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Hosts file watcher not started");
                    (None, rx)
                }
            }
        }
        _ => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };
    node.spawn_refresh(Arc::clone(&provider), updates, &shutdown);

    signals::shutdown_signal().await;
    shutdown.trigger();
    node.wait().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
