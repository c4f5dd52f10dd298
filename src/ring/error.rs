//! Errors of the routing and forwarding layer.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::codec::CodecError;

/// Errors that can occur while routing a request to its owner.
#[derive(Debug, Error)]
pub enum RingError {
    /// Membership has not been bootstrapped yet.
    #[error("Ringpop is not ready")]
    NotReady,

    /// The owner of a key could not be resolved.
    #[error("Can't resolve dst node: {0}")]
    Lookup(String),

    /// This node's identity could not be resolved.
    #[error("Can't resolve who am I: {0}")]
    Identity(String),

    /// The incoming request could not be buffered for forwarding.
    #[error("Unable to write incoming request to buffer: {0}")]
    Serialization(String),

    /// Transport failure or error reply from the owner.
    #[error("Unable to forward request to {node}: {reason}")]
    Forward { node: String, reason: String },

    /// The owner did not reply within the forward timeout.
    #[error("Forward to {node} timed out after {after:?}")]
    Timeout { node: String, after: Duration },

    /// The inbound request went away while its forward was in flight.
    #[error("Forward to {node} cancelled")]
    Cancelled { node: String },

    /// The owner replied with bytes that are not an HTTP response.
    #[error("Unable to copy response from raw: {0}")]
    MalformedResponse(#[source] CodecError),

    /// A peer sent bytes that are not an HTTP request.
    #[error("Error on reading request from raw data: {0}")]
    PeerParse(#[source] CodecError),

    /// A peer exchange arrived on a channel this node does not serve.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A peer exchange carried a payload format other than HTTP.
    #[error("Unsupported payload format: {0}")]
    UnsupportedFormat(String),

    /// The discovery provider failed while joining or refreshing the ring.
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

impl RingError {
    /// HTTP status reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RingError::NotReady
            | RingError::Lookup(_)
            | RingError::Identity(_)
            | RingError::Discovery(_) => StatusCode::SERVICE_UNAVAILABLE,
            RingError::Serialization(_) | RingError::PeerParse(_) => StatusCode::BAD_REQUEST,
            RingError::Forward { .. }
            | RingError::Cancelled { .. }
            | RingError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            RingError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RingError::UnknownChannel(_) => StatusCode::NOT_FOUND,
            RingError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

impl IntoResponse for RingError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RingError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            RingError::Forward { node: "a:1".into(), reason: "refused".into() }.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RingError::Timeout { node: "a:1".into(), after: Duration::from_secs(1) }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RingError::PeerParse(CodecError::Incomplete).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn messages_keep_plain_text_form() {
        assert_eq!(RingError::NotReady.to_string(), "Ringpop is not ready");
        assert_eq!(
            RingError::Lookup("ring is empty".into()).to_string(),
            "Can't resolve dst node: ring is empty"
        );
    }
}
