//! Cluster membership and key ownership.
//!
//! # Responsibilities
//! - Answer "who owns this key" and "who am I"
//! - Join the cluster from a discovery source and keep the ring current
//! - Deliver forwarded messages to other members
//!
//! # Design Decisions
//! - The ring is an immutable snapshot swapped atomically (`ArcSwap`), so
//!   lookups never take a lock
//! - No failure detection: membership is whatever discovery returns
//! - A node is always a member of its own ring

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::discovery::DiscoverProvider;
use crate::ring::error::RingError;
use crate::ring::hashring::HashRing;
use crate::ring::transport::{ForwardRequest, PeerTransport};

/// Membership oracle consulted by the router.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Identity of this node.
    fn who_am_i(&self) -> Result<String, RingError>;

    /// Whether the node has joined the ring.
    fn ready(&self) -> bool;

    /// Owner of `key`.
    fn lookup(&self, key: &str) -> Result<String, RingError>;

    /// Deliver a message to another member and wait for its reply.
    async fn forward(
        &self,
        request: ForwardRequest,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError>;

    /// Join the cluster using hosts from `provider`.
    async fn bootstrap(&self, provider: &dyn DiscoverProvider) -> Result<Vec<String>, RingError>;
}

/// Owner of `key`, refusing to answer before the node has joined.
pub fn resolve_destination_node(
    membership: &dyn Membership,
    key: &str,
) -> Result<String, RingError> {
    if !membership.ready() {
        return Err(RingError::NotReady);
    }
    membership.lookup(key)
}

/// Ring view exposed on the debug listener.
#[derive(Debug, Clone, Serialize)]
pub struct RingSnapshot {
    pub identity: String,
    pub ready: bool,
    pub replica_points: usize,
    pub checksum: u32,
    pub servers: Vec<String>,
}

/// Membership backed by a consistent hash ring fed from discovery.
pub struct RingMembership {
    identity: String,
    ring: ArcSwap<HashRing>,
    ready: AtomicBool,
    replica_points: usize,
    transport: PeerTransport,
}

impl RingMembership {
    pub fn new(
        identity: impl Into<String>,
        replica_points: usize,
        transport: PeerTransport,
    ) -> Self {
        Self {
            identity: identity.into(),
            ring: ArcSwap::from_pointee(HashRing::new(replica_points)),
            ready: AtomicBool::new(false),
            replica_points,
            transport,
        }
    }

    /// Rebuild the ring from `hosts`.
    ///
    /// Returns true if the membership changed.
    pub fn refresh(&self, hosts: &[String]) -> bool {
        let next = HashRing::with_servers(
            self.replica_points,
            hosts.iter().cloned().chain(std::iter::once(self.identity.clone())),
        );

        let current = self.ring.load();
        if current.server_count() > 0 && current.checksum() == next.checksum() {
            return false;
        }

        tracing::info!(
            identity = %self.identity,
            servers = next.server_count(),
            checksum = next.checksum(),
            "Ring membership updated"
        );
        self.ring.store(Arc::new(next));
        true
    }

    pub fn snapshot(&self) -> RingSnapshot {
        let ring = self.ring.load();
        RingSnapshot {
            identity: self.identity.clone(),
            ready: self.ready(),
            replica_points: ring.replica_points(),
            checksum: ring.checksum(),
            servers: ring.servers(),
        }
    }

    /// Keep the ring current until shutdown.
    ///
    /// Re-runs discovery every `interval` (zero disables polling) and applies
    /// host lists pushed on `updates`.
    pub async fn run_refresh(
        self: Arc<Self>,
        provider: Arc<dyn DiscoverProvider>,
        interval: Duration,
        mut updates: mpsc::UnboundedReceiver<Vec<String>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let polling = !interval.is_zero();
        let mut ticker = time::interval(if polling { interval } else { Duration::from_secs(3600) });
        // The first tick fires immediately; bootstrap already ran discovery.
        ticker.tick().await;

        tracing::info!(interval_secs = interval.as_secs(), polling, "Ring refresh starting");

        loop {
            tokio::select! {
                _ = ticker.tick(), if polling => {
                    match provider.hosts().await {
                        Ok(hosts) => {
                            self.refresh(&hosts);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Discovery failed, keeping current ring")
                        }
                    }
                }
                Some(hosts) = updates.recv() => {
                    self.refresh(&hosts);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Ring refresh received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Membership for RingMembership {
    fn who_am_i(&self) -> Result<String, RingError> {
        if self.identity.is_empty() {
            return Err(RingError::Identity("no identity configured".to_string()));
        }
        Ok(self.identity.clone())
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn lookup(&self, key: &str) -> Result<String, RingError> {
        let ring = self.ring.load();
        ring.lookup(key)
            .map(str::to_string)
            .ok_or_else(|| RingError::Lookup("ring is empty".to_string()))
    }

    async fn forward(
        &self,
        request: ForwardRequest,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        self.transport.send(request, cancel).await
    }

    async fn bootstrap(&self, provider: &dyn DiscoverProvider) -> Result<Vec<String>, RingError> {
        let hosts = provider
            .hosts()
            .await
            .map_err(|e| RingError::Discovery(e.to_string()))?;

        if !hosts.iter().any(|h| h == &self.identity) {
            tracing::warn!(
                identity = %self.identity,
                discovered = hosts.len(),
                "Own identity not among discovered hosts, joining anyway"
            );
        }

        self.refresh(&hosts);
        self.ready.store(true, Ordering::Release);

        let joined = self.ring.load().servers();
        tracing::info!(identity = %self.identity, members = ?joined, "Joined ring");
        Ok(joined)
    }
}
