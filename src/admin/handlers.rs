use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::DebugState;
use crate::observability::metrics::MetricsSnapshot;
use crate::ring::membership::RingSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub identity: String,
    pub ready: bool,
    pub counters: MetricsSnapshot,
}

pub async fn get_status(State(state): State<DebugState>) -> Json<SystemStatus> {
    let ring = state.membership.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        identity: ring.identity,
        ready: ring.ready,
        counters: state.metrics.snapshot(),
    })
}

pub async fn get_ring(State(state): State<DebugState>) -> Json<RingSnapshot> {
    Json(state.membership.snapshot())
}

pub async fn get_metrics(State(state): State<DebugState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}
