//! Downstream backend abstraction.
//!
//! # Responsibilities
//! - Execute a request and produce its response, whichever node asked
//!
//! # Design Decisions
//! - Single method, infallible: failures are expressed as HTTP responses
//!   (502/504) so the peer receiver can relay them like any other reply

pub mod reverse_proxy;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

pub use reverse_proxy::ReverseProxyBackend;

/// The service requests are ultimately executed against.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn serve(&self, request: Request<Body>) -> Response<Body>;
}
