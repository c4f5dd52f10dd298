//! Execution of requests forwarded by other nodes.
//!
//! # Data Flow
//! ```text
//! raw bytes → HttpRequest::parse → Backend::serve
//!     → ResponseRecorder → HttpResponse::to_bytes → raw bytes
//! ```
//!
//! # Design Decisions
//! - Ownership is not re-checked: a forwarded request is always served
//! - Unparsable input fails the exchange instead of serving a blank request

use std::sync::Arc;

use axum::body::Bytes;

use crate::backend::Backend;
use crate::http::codec::HttpRequest;
use crate::http::request::request_id;
use crate::observability::metrics::RouterMetrics;
use crate::ring::error::RingError;
use crate::ring::recorder::ResponseRecorder;

pub struct PeerReceiver {
    backend: Arc<dyn Backend>,
    metrics: Arc<RouterMetrics>,
}

impl PeerReceiver {
    pub fn new(backend: Arc<dyn Backend>, metrics: Arc<RouterMetrics>) -> Self {
        Self { backend, metrics }
    }

    /// Serve one serialized request against the local backend.
    pub async fn receive(&self, raw: &[u8]) -> Result<Bytes, RingError> {
        self.metrics.record_peer_request();

        let request = HttpRequest::parse(raw).map_err(|e| {
            tracing::error!(error = %e, size = raw.len(), "Error on reading request from raw data");
            RingError::PeerParse(e)
        })?;

        tracing::debug!(
            request_id = %request_id(&request.headers),
            method = %request.method,
            uri = %request.uri,
            "Serving forwarded request"
        );

        let method = request.method.clone();
        let response = self.backend.serve(request.into_request()).await;
        let recorder = ResponseRecorder::record(response).await;
        Ok(recorder.reconstruct().to_bytes(&method))
    }
}
