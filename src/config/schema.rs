//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure of a node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a ring node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Ring listener, identity and hashing.
    pub ring: RingConfig,

    /// Where cluster members come from.
    pub discovery: DiscoveryConfig,

    /// Downstream service requests are executed against.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits.
    pub security: SecurityConfig,
}

/// Client-facing listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000" or ":3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Ring membership configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RingConfig {
    /// Peer listener bind address; its port is part of the node identity.
    pub listen_address: String,

    /// Address other nodes reach this node on. Defaults to the listen host.
    pub peer_ip: Option<String>,

    /// Points per server on the hash ring.
    pub replica_points: usize,

    /// Deadline for one forwarded exchange in milliseconds.
    pub forward_timeout_ms: u64,

    /// Discovery polling interval in seconds (0 disables polling).
    pub refresh_interval_secs: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".to_string(),
            peer_ip: None,
            replica_points: 100,
            forward_timeout_ms: 30_000,
            refresh_interval_secs: 30,
        }
    }
}

/// Discovery sources. The first configured one wins: json file, DNS, hosts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// JSON file with a list of "host:port" members.
    pub json_file: Option<String>,

    /// Hostname resolving to all members.
    pub dns_host: Option<String>,

    /// Ring port appended to DNS results.
    pub dns_port: u16,

    /// Inline member list.
    pub hosts: Vec<String>,

    /// Watch the JSON file and apply changes immediately.
    pub watch_file: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            json_file: None,
            dns_host: None,
            dns_port: 0,
            hosts: Vec::new(),
            watch_file: true,
        }
    }
}

/// Downstream backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL requests are proxied to.
    pub url: String,

    /// Backend response timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4000/".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Client request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,

    /// Serve the debug listener.
    pub debug_enabled: bool,

    /// Debug listener bind address.
    pub debug_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            debug_enabled: true,
            debug_address: "0.0.0.0:6000".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes, also bounds forwarded payloads.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Expand the `:port` shorthand to all interfaces.
pub fn normalize_bind_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

/// Host part of a `host:port` address, brackets removed.
pub fn address_host(address: &str) -> &str {
    let host = match address.rfind(':') {
        Some(idx) => &address[..idx],
        None => address,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

impl RingConfig {
    /// Host part of this node's identity: the peer IP, else the listen
    /// host, else loopback when the listener binds all interfaces.
    pub fn identity_host(&self) -> String {
        if let Some(ip) = self.peer_ip.as_deref().filter(|ip| !ip.is_empty()) {
            return ip.to_string();
        }
        match address_host(&normalize_bind_address(&self.listen_address)) {
            "" | "0.0.0.0" | "::" => "127.0.0.1".to_string(),
            host => host.to_string(),
        }
    }
}
