//! Cluster discovery.
//!
//! # Data Flow
//! ```text
//! json file / DNS name / inline list
//!     → DiscoverProvider::hosts() ("host:port" list)
//!     → RingMembership::bootstrap / refresh
//!
//! On hosts file change:
//!     watcher.rs re-reads the file
//!     → pushes the new list to the refresh loop
//! ```
//!
//! # Design Decisions
//! - One provider per node, chosen at startup by `ProviderBuilder`
//! - Providers are polled; only the file source also pushes changes

pub mod dns;
pub mod json_file;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::schema::DiscoveryConfig;

pub use dns::DnsProvider;
pub use json_file::JsonFileProvider;
pub use watcher::HostsFileWatcher;

/// Errors that can occur while discovering cluster members.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read hosts file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid hosts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not enough arguments for building discovery provider")]
    NotConfigured,
}

/// Source of the cluster's member list.
#[async_trait]
pub trait DiscoverProvider: Send + Sync {
    /// Current members as `host:port` strings.
    async fn hosts(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Fixed member list.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    hosts: Vec<String>,
}

impl StaticProvider {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl DiscoverProvider for StaticProvider {
    async fn hosts(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.hosts.clone())
    }
}

/// Picks a provider from whatever sources are configured.
///
/// Precedence: JSON file, then DNS (host and non-zero port), then an inline
/// host list.
#[derive(Debug, Clone, Default)]
pub struct ProviderBuilder {
    json_file: Option<PathBuf>,
    dns_host: Option<String>,
    dns_port: u16,
    static_hosts: Vec<String>,
}

impl ProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let mut builder = Self::new().with_static_hosts(config.hosts.clone());
        if let Some(path) = &config.json_file {
            builder = builder.with_json_file(path);
        }
        if let Some(host) = &config.dns_host {
            builder = builder.with_dns(host, config.dns_port);
        }
        builder
    }

    pub fn with_json_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.json_file = if path.as_os_str().is_empty() { None } else { Some(path) };
        self
    }

    pub fn with_dns(mut self, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        self.dns_host = if host.is_empty() { None } else { Some(host) };
        self.dns_port = port;
        self
    }

    pub fn with_static_hosts(mut self, hosts: Vec<String>) -> Self {
        self.static_hosts = hosts;
        self
    }

    pub fn build(self) -> Result<Arc<dyn DiscoverProvider>, DiscoveryError> {
        if let Some(path) = self.json_file {
            tracing::info!(path = ?path, "Using JSON file discovery");
            return Ok(Arc::new(JsonFileProvider::new(path)));
        }

        if let Some(host) = self.dns_host.filter(|_| self.dns_port != 0) {
            tracing::info!(host = %host, port = self.dns_port, "Using DNS discovery");
            return Ok(Arc::new(DnsProvider::new(host, self.dns_port)));
        }

        if !self.static_hosts.is_empty() {
            tracing::info!(hosts = ?self.static_hosts, "Using static discovery");
            return Ok(Arc::new(StaticProvider::new(self.static_hosts)));
        }

        Err(DiscoveryError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_configured_is_an_error() {
        let err = ProviderBuilder::new().build().err().unwrap();
        assert_eq!(err.to_string(), "Not enough arguments for building discovery provider");

        // A DNS host without a port is not enough.
        assert!(ProviderBuilder::new().with_dns("ring.local", 0).build().is_err());
    }

    #[tokio::test]
    async fn static_hosts_are_returned_as_is() {
        let provider = ProviderBuilder::new()
            .with_static_hosts(vec!["127.0.0.1:5000".into(), "127.0.0.1:5001".into()])
            .build()
            .unwrap();
        assert_eq!(provider.hosts().await.unwrap(), vec!["127.0.0.1:5000", "127.0.0.1:5001"]);
    }

    #[tokio::test]
    async fn json_file_takes_precedence() {
        let dir = std::env::temp_dir()
            .join(format!("hashring-proxy-builder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hosts.json");
        std::fs::write(&path, r#"["10.0.0.1:5000"]"#).unwrap();

        let provider = ProviderBuilder::new()
            .with_static_hosts(vec!["127.0.0.1:5000".into()])
            .with_dns("localhost", 5000)
            .with_json_file(&path)
            .build()
            .unwrap();
        assert_eq!(provider.hosts().await.unwrap(), vec!["10.0.0.1:5000"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
