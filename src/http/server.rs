//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all handler
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Bind server to listener
//! - Decide per request: serve locally or forward to the owner
//! - Mark responses with the receiving and handling node

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, Response},
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::backend::Backend;
use crate::config::NodeConfig;
use crate::http::codec::{HttpRequest, HttpResponse};
use crate::http::request::{request_id, ClientAddr, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::{
    set_identity, strip_hop_by_hop, HEADER_HANDLED_BY, HEADER_PROXY, HEADER_RECEIVED_BY,
};
use crate::observability::metrics::RouterMetrics;
use crate::ring::error::RingError;
use crate::ring::forwarder::Forwarder;
use crate::ring::key::request_to_key;
use crate::ring::membership::{resolve_destination_node, Membership};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub membership: Arc<dyn Membership>,
    pub forwarder: Arc<dyn Forwarder>,
    pub backend: Arc<dyn Backend>,
    pub metrics: Arc<RouterMetrics>,
    pub max_body_size: usize,
}

/// Client-facing HTTP server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &NodeConfig) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &NodeConfig, state: AppState) -> Router {
        let x_request_id = header::HeaderName::from_static(X_REQUEST_ID);
        let max_body_size = state.max_body_size;

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main handler.
/// Resolves the owner of the request and serves it locally or remotely.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response<Body> {
    state.metrics.record_http_request();

    let request_id = request_id(request.headers()).to_string();
    let key = request_to_key(request.headers(), &addr.to_string());

    let (owner, me) = match resolve_destination_node(state.membership.as_ref(), &key)
        .and_then(|owner| Ok((owner, state.membership.who_am_i()?)))
    {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                key = %key,
                error = %e,
                "Unable to route request"
            );
            return e.into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        key = %key,
        owner = %owner,
        method = %request.method(),
        path = %request.uri().path(),
        "Routing request"
    );

    set_identity(request.headers_mut(), HEADER_RECEIVED_BY, &me);

    // Dropping the handler future (client gone, timeout) cancels the forward.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let mut response = if owner == me {
        serve_locally(&state, request, addr, &me).await
    } else {
        match forward_to_owner(&state, request, &owner, &key, cancel).await {
            Ok(response) => response,
            Err(e) => {
                state.metrics.record_forward_failure();
                tracing::error!(
                    request_id = %request_id,
                    key = %key,
                    owner = %owner,
                    error = %e,
                    "Unable to forward request"
                );
                e.into_response()
            }
        }
    };

    set_identity(response.headers_mut(), HEADER_RECEIVED_BY, &me);
    response
}

async fn serve_locally(
    state: &AppState,
    mut request: Request<Body>,
    client: SocketAddr,
    me: &str,
) -> Response<Body> {
    set_identity(request.headers_mut(), HEADER_PROXY, me);
    request.extensions_mut().insert(ClientAddr(client));

    let mut response = state.backend.serve(request).await;
    set_identity(response.headers_mut(), HEADER_HANDLED_BY, me);
    state.metrics.record_local_serve();
    response
}

async fn forward_to_owner(
    state: &AppState,
    request: Request<Body>,
    owner: &str,
    key: &str,
    cancel: CancellationToken,
) -> Result<Response<Body>, RingError> {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();

    let host = HeaderValue::from_str(owner).map_err(|e| RingError::Serialization(e.to_string()))?;
    parts.headers.insert(header::HOST, host);

    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| RingError::Serialization(e.to_string()))?;

    let method = parts.method.clone();
    let payload = HttpRequest::from_parts(parts, body).to_bytes();

    let reply = state.forwarder.forward(owner, key, payload, cancel).await?;

    let mut relayed = HttpResponse::parse(&reply, &method).map_err(RingError::MalformedResponse)?;
    strip_hop_by_hop(&mut relayed.headers);

    let mut response = relayed.into_response();
    set_identity(response.headers_mut(), HEADER_HANDLED_BY, owner);
    state.metrics.record_forward(start.elapsed());
    Ok(response)
}
