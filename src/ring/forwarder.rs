//! Forwarding of serialized requests to their owner.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio_util::sync::CancellationToken;

use crate::ring::error::RingError;
use crate::ring::membership::Membership;
use crate::ring::transport::{ForwardRequest, Format};

/// Channel every request exchange travels on.
pub const CHANNEL_NAME: &str = "ringpop-channel";

/// Peer endpoint serving request exchanges.
pub const ENDPOINT: &str = "/request-exchange";

/// Sends a serialized request to `node` and returns its serialized response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        node: &str,
        key: &str,
        request: Bytes,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError>;
}

/// Forwarder that delivers through the membership's transport.
pub struct RequestForwarder {
    channel_name: String,
    endpoint: String,
    membership: Arc<dyn Membership>,
}

impl RequestForwarder {
    pub fn new(membership: Arc<dyn Membership>) -> Self {
        Self {
            channel_name: CHANNEL_NAME.to_string(),
            endpoint: ENDPOINT.to_string(),
            membership,
        }
    }
}

#[async_trait]
impl Forwarder for RequestForwarder {
    async fn forward(
        &self,
        node: &str,
        key: &str,
        request: Bytes,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        tracing::info!(
            node = %node,
            key = %key,
            channel = %self.channel_name,
            endpoint = %self.endpoint,
            "Forwarding request"
        );

        let caller = self.membership.who_am_i()?;
        let message = ForwardRequest {
            destination: node.to_string(),
            caller,
            keys: vec![key.to_string()],
            payload: request,
            channel: self.channel_name.clone(),
            endpoint: self.endpoint.clone(),
            format: Format::Http,
        };

        self.membership.forward(message, cancel).await
    }
}
