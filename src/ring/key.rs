//! Routing key extraction.
//!
//! The key is the client IP: the nearest public hop of the proxy chain when
//! one is present, otherwise the socket address of the connection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use axum::http::HeaderMap;

/// Proxy-chain headers, in priority order.
const CLIENT_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Convert a request into the key used for the hash ring.
///
/// Each header's address list is scanned right to left and the first public
/// address wins; that is the address right before our proxy.
pub fn request_to_key(headers: &HeaderMap, remote_addr: &str) -> String {
    for name in CLIENT_IP_HEADERS {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");

        for candidate in joined.rsplit(',') {
            let candidate = candidate.trim();
            match candidate.parse::<IpAddr>() {
                Ok(ip) if is_global_unicast(ip) => return candidate.to_string(),
                _ => continue,
            }
        }
    }

    remote_addr.to_string()
}

/// Publicly routable unicast address.
pub fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_global_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_global_v4(v4),
            None => is_global_v6(v6),
        },
    }
}

fn is_global_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_multicast())
}

fn is_global_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let link_local = first & 0xffc0 == 0xfe80;
    let unique_local = first & 0xfe00 == 0xfc00;
    !(ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() || link_local || unique_local)
}
