//! Hosts file watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::discovery::json_file::read_hosts_file;

/// Monitors the JSON hosts file and pushes every valid new list.
pub struct HostsFileWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Vec<String>>,
}

impl HostsFileWatcher {
    /// Returns the watcher and a receiver for host list updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Hosts file change detected, reloading");
                        match read_hosts_file(&path) {
                            Ok(hosts) => {
                                let _ = tx.send(hosts);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload hosts file, keeping current ring"
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Hosts file watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Hosts file watcher started");
        Ok(watcher)
    }
}
