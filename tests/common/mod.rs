//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use hashring_proxy::config::NodeConfig;
use hashring_proxy::discovery::StaticProvider;
use hashring_proxy::lifecycle::{self, Node, Shutdown};

/// Start a backend answering `"backend {name} {method} {path?query} {body}"`.
///
/// The reply echoes `x-ringpop-received-by`, `x-proxy` and `x-forwarded-for`
/// back as `x-echo-*` headers.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    async fn echo(
        State(name): State<&'static str>,
        ConnectInfo(_remote): ConnectInfo<SocketAddr>,
        request: Request<Body>,
    ) -> (HeaderMap, String) {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

        let mut headers = HeaderMap::new();
        for (from, to) in [
            ("x-ringpop-received-by", "x-echo-received-by"),
            ("x-proxy", "x-echo-proxy"),
            ("x-forwarded-for", "x-echo-forwarded-for"),
        ] {
            if let Some(value) = parts.headers.get(from) {
                headers.insert(to, value.clone());
            }
        }

        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        (
            headers,
            format!(
                "backend {} {} {} {}",
                name,
                parts.method,
                target,
                String::from_utf8_lossy(&body)
            ),
        )
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo))
        .with_state(name);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

/// Node configuration on ephemeral loopback ports.
pub fn node_config(backend: SocketAddr) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.ring.listen_address = "127.0.0.1:0".to_string();
    config.ring.forward_timeout_ms = 5_000;
    config.ring.refresh_interval_secs = 0;
    config.backend.url = format!("http://{}/", backend);
    config.observability.metrics_enabled = false;
    config.observability.debug_enabled = false;
    config
}

/// A started cluster sharing one shutdown coordinator.
pub struct Cluster {
    pub nodes: Vec<Node>,
    pub shutdown: Shutdown,
}

impl Cluster {
    /// Start one node per backend and join them all into one ring.
    pub async fn start(backends: &[SocketAddr]) -> Self {
        let shutdown = Shutdown::new();
        let mut nodes = Vec::new();
        for backend in backends {
            nodes.push(
                lifecycle::start(&node_config(*backend), &shutdown, None)
                    .await
                    .unwrap(),
            );
        }

        let identities: Vec<String> = nodes.iter().map(|n| n.identity.clone()).collect();
        let provider = Arc::new(StaticProvider::new(identities));
        for node in &nodes {
            node.bootstrap(provider.as_ref()).await.unwrap();
        }

        Self { nodes, shutdown }
    }

    pub fn url(&self, node: usize, path: &str) -> String {
        format!("http://{}{}", self.nodes[node].http_addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        for node in self.nodes {
            node.wait().await;
        }
    }
}
