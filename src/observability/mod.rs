//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router / Peer Receiver
//!     → metrics.rs (RouterMetrics counters, mirrored to Prometheus)
//!     → logging.rs (structured log events via tracing)
//!
//! Consumers:
//!     → stdout
//!     → debug listener /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
