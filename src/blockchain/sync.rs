//! Best-effort propagation of newly mined blocks to registered peers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::task::JoinError;

use super::block::Block;
use super::registry::NodeRegistry;
use super::storage::{ReplicationStore, StorageError};

/// Errors that can occur while delivering a block to a peer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Peer {peer} unreachable: {source}")]
    Network {
        peer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Peer {peer} rejected block: HTTP status {status}")]
    Rejected { peer: String, status: StatusCode },

    #[error("Peer {peer} did not answer in time")]
    Timeout { peer: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Delivery task failed: {0}")]
    Task(#[from] JoinError),
}

/// A way of handing a block to one peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn deliver(&self, peer_id: &str, block: &Block) -> Result<(), SyncError>;
}

/// Writes blocks straight into the peers' replication files
///
/// File writes run on the blocking pool so several peers are written in
/// parallel and the broadcaster's timeout can stop waiting on a slow disk.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    store: Arc<ReplicationStore>,
}

impl LocalTransport {
    pub fn new(store: Arc<ReplicationStore>) -> Self {
        LocalTransport { store }
    }
}

#[async_trait]
impl PeerTransport for LocalTransport {
    async fn deliver(&self, peer_id: &str, block: &Block) -> Result<(), SyncError> {
        let store = self.store.clone();
        let peer_id = peer_id.to_string();
        let block = block.clone();

        tokio::task::spawn_blocking(move || store.append(&peer_id, &block)).await??;
        Ok(())
    }
}

/// POSTs blocks to `http://<peer_id>:<port>/sync`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    port: u16,
}

impl HttpTransport {
    /// Creates a transport whose requests give up after `timeout`
    pub fn new(port: u16, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(SyncError::Client)?;

        Ok(HttpTransport { client, port })
    }

    pub fn sync_url(&self, peer_id: &str) -> String {
        format!("http://{}:{}/sync", peer_id, self.port)
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn deliver(&self, peer_id: &str, block: &Block) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.sync_url(peer_id))
            .json(block)
            .send()
            .await
            .map_err(|source| SyncError::Network {
                peer: peer_id.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Rejected {
                peer: peer_id.to_string(),
                status,
            });
        }

        Ok(())
    }
}

/// Result of delivering one block to one registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOutcome {
    pub peer_id: String,
    pub delivered: bool,
    pub error: Option<String>,
}

/// Per-peer results of a broadcast, in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub outcomes: Vec<PeerOutcome>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PeerOutcome> {
        self.outcomes.iter().filter(|o| !o.delivered)
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.delivered)
    }
}

/// Fans a block out to every registered peer
///
/// Each peer is attempted once, concurrently and independently. A failing
/// peer is logged and reported but never stops delivery to the others.
pub struct SyncBroadcaster {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn PeerTransport>,
    peer_timeout: Duration,
}

impl std::fmt::Debug for SyncBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBroadcaster")
            .field("registry", &self.registry)
            .field("peer_timeout", &self.peer_timeout)
            .finish()
    }
}

impl SyncBroadcaster {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<dyn PeerTransport>,
        peer_timeout: Duration,
    ) -> Self {
        SyncBroadcaster {
            registry,
            transport,
            peer_timeout,
        }
    }

    /// Delivers `block` to every registered peer except `exclude`
    ///
    /// # Returns
    ///
    /// The per-peer outcomes, or an error if the registry itself can't be read
    pub async fn broadcast(
        &self,
        block: &Block,
        exclude: Option<&str>,
    ) -> Result<BroadcastReport, StorageError> {
        let peers: Vec<String> = self
            .registry
            .load()?
            .into_iter()
            .filter(|peer| Some(peer.as_str()) != exclude)
            .collect();

        let deliveries = peers.iter().map(|peer| self.deliver_one(peer, block));
        let outcomes = join_all(deliveries).await;

        debug!(
            "Broadcast block {} to {} peer(s)",
            block.id,
            outcomes.len()
        );
        Ok(BroadcastReport { outcomes })
    }

    async fn deliver_one(&self, peer_id: &str, block: &Block) -> PeerOutcome {
        let result = match tokio::time::timeout(self.peer_timeout, self.transport.deliver(peer_id, block)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                peer: peer_id.to_string(),
            }),
        };

        match result {
            Ok(()) => PeerOutcome {
                peer_id: peer_id.to_string(),
                delivered: true,
                error: None,
            },
            Err(err) => {
                warn!("Error syncing block {} with node {}: {}", block.id, peer_id, err);
                PeerOutcome {
                    peer_id: peer_id.to_string(),
                    delivered: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
