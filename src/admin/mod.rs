//! Debug listener.
//!
//! Read-only views of the node for operators: Prometheus metrics, status
//! and the current ring.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::observability::metrics::RouterMetrics;
use crate::ring::membership::RingMembership;

use self::handlers::*;

#[derive(Clone)]
pub struct DebugState {
    pub membership: Arc<RingMembership>,
    pub metrics: Arc<RouterMetrics>,
    pub prometheus: Option<PrometheusHandle>,
}

pub fn setup_debug_router(state: DebugState) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/debug/status", get(get_status))
        .route("/debug/ring", get(get_ring))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
