//! Peer listener serving request exchanges.
//!
//! # Responsibilities
//! - Accept serialized requests from other nodes on the exchange endpoint
//! - Validate channel and payload format before touching the backend
//! - Reply with the serialized backend response

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::ring::error::RingError;
use crate::ring::forwarder::{CHANNEL_NAME, ENDPOINT};
use crate::ring::membership::Membership;
use crate::ring::receiver::PeerReceiver;
use crate::ring::transport::{Format, HEADER_CALLER, HEADER_CHANNEL, HEADER_FORMAT, HEADER_KEY};

/// Headroom over the client body limit for the serialized request head.
const HEAD_ALLOWANCE: usize = 64 * 1024;

#[derive(Clone)]
struct RingState {
    receiver: Arc<PeerReceiver>,
    membership: Arc<dyn Membership>,
}

pub struct RingServer {
    router: Router,
}

impl RingServer {
    pub fn new(
        receiver: Arc<PeerReceiver>,
        membership: Arc<dyn Membership>,
        max_body_size: usize,
    ) -> Self {
        let state = RingState { receiver, membership };
        let router = Router::new()
            .route(ENDPOINT, post(exchange_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body_size + HEAD_ALLOWANCE))
            .layer(TraceLayer::new_for_http());
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Ring listener starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Ring listener stopped");
        Ok(())
    }
}

async fn exchange_handler(
    State(state): State<RingState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let channel = header_str(&headers, HEADER_CHANNEL);
    if channel != CHANNEL_NAME {
        tracing::warn!(channel = %channel, "Exchange on unknown channel rejected");
        return RingError::UnknownChannel(channel.to_string()).into_response();
    }

    if let Err(e) = header_str(&headers, HEADER_FORMAT).parse::<Format>() {
        tracing::warn!(error = %e, "Exchange with unsupported format rejected");
        return e.into_response();
    }

    let caller = header_str(&headers, HEADER_CALLER).to_string();
    let keys: Vec<&str> = headers
        .get_all(HEADER_KEY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    tracing::debug!(caller = %caller, keys = ?keys, size = body.len(), "Request exchange received");

    // Ownership may have moved since the caller's lookup; serve regardless.
    if let Ok(me) = state.membership.who_am_i() {
        for key in &keys {
            if let Ok(owner) = state.membership.lookup(key) {
                if owner != me {
                    tracing::warn!(
                        key = %key,
                        owner = %owner,
                        caller = %caller,
                        "Serving forwarded request for a key this node no longer owns"
                    );
                }
            }
        }
    }

    match state.receiver.receive(&body).await {
        Ok(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            reply,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}
