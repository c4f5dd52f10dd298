//! Response handling and transformation.
//!
//! # Responsibilities
//! - Ring markers on responses (received-by, handled-by)
//! - Strip hop-by-hop headers when relaying a message
//!
//! # Design Decisions
//! - Markers are inserted, never appended, so each appears exactly once
//! - Bodies on the forward path are buffered, so framing headers from the
//!   original hop are meaningless and removed

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Node that accepted the request from the client.
pub const HEADER_RECEIVED_BY: HeaderName = HeaderName::from_static("x-ringpop-received-by");

/// Node that executed the backend call.
pub const HEADER_HANDLED_BY: HeaderName = HeaderName::from_static("x-ringpop-handled-by");

/// Set on requests served locally, informational.
pub const HEADER_PROXY: HeaderName = HeaderName::from_static("x-proxy");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Insert a node identity under `name`, replacing any previous value.
///
/// Returns false when the identity is not a valid header value.
pub fn set_identity(headers: &mut HeaderMap, name: HeaderName, identity: &str) -> bool {
    match HeaderValue::from_str(identity) {
        Ok(value) => {
            headers.insert(name, value);
            true
        }
        Err(_) => {
            tracing::warn!(
                identity = %identity,
                header = %name,
                "Identity is not a valid header value"
            );
            false
        }
    }
}

/// Remove hop-by-hop headers, including those listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}
