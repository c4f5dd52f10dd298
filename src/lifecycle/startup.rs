//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind listeners and derive the node identity
//! - Initialize subsystems in dependency order
//! - Start the ring, HTTP and debug servers
//! - Join the ring and keep it current
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Servers run before bootstrap so peers can reach a joining node

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{setup_debug_router, DebugState};
use crate::backend::{Backend, ReverseProxyBackend};
use crate::config::schema::{normalize_bind_address, NodeConfig};
use crate::discovery::DiscoverProvider;
use crate::http::server::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics::RouterMetrics;
use crate::ring::error::RingError;
use crate::ring::forwarder::RequestForwarder;
use crate::ring::membership::{Membership, RingMembership};
use crate::ring::receiver::PeerReceiver;
use crate::ring::server::RingServer;
use crate::ring::transport::PeerTransport;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid backend url {url}: {source}")]
    Backend {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to join the ring: {0}")]
    Join(#[source] RingError),
}

/// A running node.
pub struct Node {
    pub identity: String,
    pub http_addr: SocketAddr,
    pub ring_addr: SocketAddr,
    pub debug_addr: Option<SocketAddr>,
    pub membership: Arc<RingMembership>,
    pub metrics: Arc<RouterMetrics>,
    refresh_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
}

/// Build every subsystem and start serving.
///
/// The node answers 503 until `Node::bootstrap` succeeds.
pub async fn start(
    config: &NodeConfig,
    shutdown: &Shutdown,
    prometheus: Option<PrometheusHandle>,
) -> Result<Node, StartupError> {
    let metrics = Arc::new(RouterMetrics::new());
    let max_body_size = config.security.max_body_size;

    let ring_listener = bind(&config.ring.listen_address).await?;
    let ring_addr = local_addr(&ring_listener, &config.ring.listen_address)?;
    let identity = node_identity(&config.ring.identity_host(), ring_addr.port());

    tracing::info!(identity = %identity, "Node identity resolved");

    let transport = PeerTransport::new(Duration::from_millis(config.ring.forward_timeout_ms));
    let membership = Arc::new(RingMembership::new(
        identity.clone(),
        config.ring.replica_points,
        transport,
    ));

    let backend: Arc<dyn Backend> = Arc::new(
        ReverseProxyBackend::new(
            &config.backend.url,
            Duration::from_secs(config.backend.timeout_secs),
        )
        .map_err(|source| StartupError::Backend {
            url: config.backend.url.clone(),
            source,
        })?,
    );

    let mut tasks = Vec::new();

    let receiver = Arc::new(PeerReceiver::new(backend.clone(), metrics.clone()));
    let ring_server = RingServer::new(receiver, membership.clone(), max_body_size);
    let ring_shutdown = shutdown.notified();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = ring_server.run(ring_listener, ring_shutdown).await {
            tracing::error!(error = %e, "Ring listener failed");
        }
    }));

    let state = AppState {
        membership: membership.clone(),
        forwarder: Arc::new(RequestForwarder::new(membership.clone())),
        backend,
        metrics: metrics.clone(),
        max_body_size,
    };
    let http_listener = bind(&config.listener.bind_address).await?;
    let http_addr = local_addr(&http_listener, &config.listener.bind_address)?;
    let http_server = HttpServer::new(state, config);
    let http_shutdown = shutdown.notified();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = http_server.run(http_listener, http_shutdown).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    }));

    let debug_addr = if config.observability.debug_enabled {
        let listener = bind(&config.observability.debug_address).await?;
        let addr = local_addr(&listener, &config.observability.debug_address)?;
        let router = setup_debug_router(DebugState {
            membership: membership.clone(),
            metrics: metrics.clone(),
            prometheus,
        });
        let debug_shutdown = shutdown.notified();
        tasks.push(tokio::spawn(async move {
            tracing::info!(address = %addr, "Debug listener starting");
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(debug_shutdown)
                .await
            {
                tracing::error!(error = %e, "Debug listener failed");
            }
        }));
        Some(addr)
    } else {
        None
    };

    Ok(Node {
        identity,
        http_addr,
        ring_addr,
        debug_addr,
        membership,
        metrics,
        refresh_interval: Duration::from_secs(config.ring.refresh_interval_secs),
        tasks,
    })
}

impl Node {
    /// Join the ring with the hosts `provider` returns.
    pub async fn bootstrap(
        &self,
        provider: &dyn DiscoverProvider,
    ) -> Result<Vec<String>, StartupError> {
        self.membership.bootstrap(provider).await.map_err(StartupError::Join)
    }

    /// Start the membership refresh loop.
    ///
    /// `updates` carries host lists pushed by a file watcher, if any.
    pub fn spawn_refresh(
        &mut self,
        provider: Arc<dyn DiscoverProvider>,
        updates: mpsc::UnboundedReceiver<Vec<String>>,
        shutdown: &Shutdown,
    ) {
        let task = self.membership.clone().run_refresh(
            provider,
            self.refresh_interval,
            updates,
            shutdown.subscribe(),
        );
        self.tasks.push(tokio::spawn(task));
    }

    /// Wait for every server and background task to finish.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Node task panicked");
            }
        }
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let address = normalize_bind_address(address);
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

fn local_addr(listener: &TcpListener, address: &str) -> Result<SocketAddr, StartupError> {
    listener.local_addr().map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

fn node_identity(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
