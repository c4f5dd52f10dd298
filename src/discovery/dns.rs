//! Member list resolved from a DNS name.

use async_trait::async_trait;

use crate::discovery::{DiscoverProvider, DiscoveryError};

/// Resolves `host` and pairs every address with the ring port.
#[derive(Debug, Clone)]
pub struct DnsProvider {
    host: String,
    port: u16,
}

impl DnsProvider {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl DiscoverProvider for DnsProvider {
    async fn hosts(&self) -> Result<Vec<String>, DiscoveryError> {
        tracing::info!(host = %self.host, "Discovering hosts from DNS");

        // Any lookup error means no peers yet, not a failure.
        let addrs = match tokio::net::lookup_host((self.host.as_str(), self.port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "DNS lookup failed");
                return Ok(Vec::new());
            }
        };

        let mut hosts: Vec<String> = Vec::new();
        for addr in addrs {
            let host = addr.to_string();
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }

        tracing::info!(endpoints = %hosts.join(", "), "Discovered endpoints");
        Ok(hosts)
    }
}
