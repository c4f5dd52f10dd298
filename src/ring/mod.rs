//! Ownership routing across the cluster.
//!
//! # Data Flow
//! ```text
//! client request
//!     → key.rs (routing key from client IP)
//!     → membership.rs (owner lookup on the hash ring)
//!     → local: backend
//!     → remote: forwarder.rs → transport.rs → peer's server.rs
//!         → receiver.rs → backend → recorder.rs → bytes back
//! ```
//!
//! # Design Decisions
//! - Exactly one node executes each request; no retry, no fallback owner
//! - Membership and forwarding sit behind traits so the router can be
//!   exercised without a cluster

pub mod error;
pub mod forwarder;
pub mod hashring;
pub mod key;
pub mod membership;
pub mod receiver;
pub mod recorder;
pub mod server;
pub mod transport;

pub use error::RingError;
pub use forwarder::{Forwarder, RequestForwarder};
pub use hashring::HashRing;
pub use membership::{Membership, RingMembership};
pub use receiver::PeerReceiver;
pub use server::RingServer;
