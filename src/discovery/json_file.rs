//! Member list read from a JSON file.
//!
//! File format: `["127.0.0.1:5000", "127.0.0.1:5001"]`

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::discovery::{DiscoverProvider, DiscoveryError};

/// Re-reads the file on every call, so edits are picked up by polling too.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiscoverProvider for JsonFileProvider {
    async fn hosts(&self) -> Result<Vec<String>, DiscoveryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DiscoveryError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_hosts(&self.path, &content)
    }
}

/// Blocking read, for the file watcher thread.
pub fn read_hosts_file(path: &Path) -> Result<Vec<String>, DiscoveryError> {
    let content = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_hosts(path, &content)
}

pub fn parse_hosts(path: &Path, content: &str) -> Result<Vec<String>, DiscoveryError> {
    let hosts: Vec<String> = serde_json::from_str(content).map_err(|source| DiscoveryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hosts
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect())
}
