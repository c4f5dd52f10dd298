//! Node-to-node message transport.
//!
//! # Responsibilities
//! - Carry a serialized request to its owner and bring back the reply
//! - Bound every exchange by the forward timeout and a cancellation token
//!
//! # Design Decisions
//! - Plain HTTP POST to the peer listener; routing metadata rides in headers
//! - One pooled client per node, shared by all forwards

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio_util::sync::CancellationToken;

use crate::ring::error::RingError;

pub const HEADER_CALLER: &str = "x-ring-caller";
pub const HEADER_CHANNEL: &str = "x-ring-channel";
pub const HEADER_KEY: &str = "x-ring-key";
pub const HEADER_FORMAT: &str = "x-ring-format";

/// Largest peer reply accepted.
const MAX_REPLY_SIZE: usize = 64 * 1024 * 1024;

/// Payload encoding hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Http,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Http => "http",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Format::Http),
            other => Err(RingError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One message to deliver to a peer.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub destination: String,
    pub caller: String,
    pub keys: Vec<String>,
    pub payload: Bytes,
    pub channel: String,
    pub endpoint: String,
    pub format: Format,
}

/// HTTP client for peer exchanges.
#[derive(Clone)]
pub struct PeerTransport {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl PeerTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    /// Deliver `request` and return the reply payload.
    ///
    /// Resolves on reply, transport failure, timeout or cancellation,
    /// whichever comes first.
    pub async fn send(
        &self,
        request: ForwardRequest,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        let node = request.destination.clone();
        let http_request = build_request(request)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RingError::Cancelled { node: node.clone() }),
            result = tokio::time::timeout(self.timeout, self.exchange(&node, http_request)) => {
                match result {
                    Ok(reply) => reply,
                    Err(_) => Err(RingError::Timeout { node: node.clone(), after: self.timeout }),
                }
            }
        }
    }

    async fn exchange(&self, node: &str, request: Request<Body>) -> Result<Bytes, RingError> {
        let response: Response<Incoming> =
            self.client.request(request).await.map_err(|e| RingError::Forward {
                node: node.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_REPLY_SIZE)
            .await
            .map_err(|e| RingError::Forward {
                node: node.to_string(),
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(RingError::Forward {
                node: node.to_string(),
                reason: format!(
                    "peer replied {}: {}",
                    status,
                    String::from_utf8_lossy(&body).trim()
                ),
            });
        }

        Ok(body)
    }
}

fn build_request(request: ForwardRequest) -> Result<Request<Body>, RingError> {
    let uri = format!("http://{}{}", request.destination, request.endpoint);
    let invalid = |e: axum::http::Error| RingError::Forward {
        node: request.destination.clone(),
        reason: e.to_string(),
    };

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri.as_str())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(HEADER_CALLER, request.caller.as_str())
        .header(HEADER_CHANNEL, request.channel.as_str())
        .header(HEADER_FORMAT, request.format.as_str());

    for key in &request.keys {
        match HeaderValue::from_str(key) {
            Ok(value) => builder = builder.header(HEADER_KEY, value),
            Err(_) => {
                tracing::warn!(key = %key, "Routing key is not a valid header value, not sent")
            }
        }
    }

    builder.body(Body::from(request.payload.clone())).map_err(invalid)
}
