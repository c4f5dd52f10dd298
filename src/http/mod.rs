//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, limits, timeout)
//!     → ring key + owner lookup
//!     → local: request.rs (client address) → backend
//!     → remote: codec.rs (serialize) → forwarder → codec.rs (parse reply)
//!     → response.rs (ring markers, hop-by-hop stripping)
//!     → Send to client
//! ```

pub mod codec;
pub mod request;
pub mod response;
pub mod server;

pub use codec::{CodecError, HttpRequest, HttpResponse};
pub use request::{ClientAddr, MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
