//! Consistent-hash HTTP request router.
//!
//! Every request is owned by exactly one cluster member, chosen by hashing
//! the client key onto a ring; non-owners forward the serialized request to
//! the owner and relay its serialized response.

// Core subsystems
pub mod config;
pub mod http;
pub mod ring;

// Collaborators behind trait seams
pub mod backend;
pub mod discovery;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

#[cfg(test)]
pub(crate) mod testing;

pub use config::schema::NodeConfig;
pub use http::HttpServer;
pub use lifecycle::{Node, Shutdown};
