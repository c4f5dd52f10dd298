//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count client requests, local serves, forwards and peer executions
//! - Mirror counters to the `metrics` facade for Prometheus scraping
//!
//! # Metrics
//! - `ringpop_http_requests_total` (counter): requests received from clients
//! - `ringpop_requests_forwarded_to_backend_total` (counter): served locally
//! - `ringpop_requests_forwarded_to_ringpop_total` (counter): forwarded to the owner
//! - `ringpop_forward_failures_total` (counter): forwards that failed
//! - `ringpop_requests_total` (counter): requests executed for a peer
//! - `ringpop_forward_duration_seconds` (histogram): forward round-trip latency
//!
//! # Design Decisions
//! - Counters live in an injected `RouterMetrics`, not in globals
//! - Low-overhead updates (relaxed atomics)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

pub const HTTP_REQUESTS_TOTAL: &str = "ringpop_http_requests_total";
pub const FORWARDED_TO_BACKEND_TOTAL: &str = "ringpop_requests_forwarded_to_backend_total";
pub const FORWARDED_TO_RINGPOP_TOTAL: &str = "ringpop_requests_forwarded_to_ringpop_total";
pub const FORWARD_FAILURES_TOTAL: &str = "ringpop_forward_failures_total";
pub const PEER_REQUESTS_TOTAL: &str = "ringpop_requests_total";
pub const FORWARD_DURATION_SECONDS: &str = "ringpop_forward_duration_seconds";

/// Process-wide request counters, shared through `Arc`.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    http_requests: AtomicU64,
    served_locally: AtomicU64,
    forwarded: AtomicU64,
    forward_failures: AtomicU64,
    peer_requests: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub http_requests: u64,
    pub served_locally: u64,
    pub forwarded: u64,
    pub forward_failures: u64,
    pub peer_requests: u64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(HTTP_REQUESTS_TOTAL).increment(1);
    }

    pub fn record_local_serve(&self) {
        self.served_locally.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(FORWARDED_TO_BACKEND_TOTAL).increment(1);
    }

    pub fn record_forward(&self, elapsed: Duration) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(FORWARDED_TO_RINGPOP_TOTAL).increment(1);
        metrics::histogram!(FORWARD_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    pub fn record_forward_failure(&self) {
        self.forward_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(FORWARD_FAILURES_TOTAL).increment(1);
    }

    pub fn record_peer_request(&self) {
        self.peer_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(PEER_REQUESTS_TOTAL).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests: self.http_requests.load(Ordering::Relaxed),
            served_locally: self.served_locally.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            peer_requests: self.peer_requests.load(Ordering::Relaxed),
        }
    }
}

/// Install the Prometheus recorder and describe the metrics.
///
/// Fails if another recorder is already installed in this process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of received HTTP requests");
    metrics::describe_counter!(
        FORWARDED_TO_BACKEND_TOTAL,
        "Total number of requests forwarded to HTTP backend"
    );
    metrics::describe_counter!(
        FORWARDED_TO_RINGPOP_TOTAL,
        "Total number of requests forwarded to ringpop"
    );
    metrics::describe_counter!(FORWARD_FAILURES_TOTAL, "Total number of failed forwards");
    metrics::describe_counter!(PEER_REQUESTS_TOTAL, "Total number of received ringpop requests");
    metrics::describe_histogram!(
        FORWARD_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Round-trip latency of forwarded requests"
    );

    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}
