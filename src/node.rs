//! Node runtime: ties the ledger, registry, replication store and broadcaster together.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::blockchain::{
    Block, BroadcastReport, HttpTransport, Ledger, LedgerError, LocalTransport, NodeRegistry,
    PeerTransport, ReplicationStore, StorageError, SyncBroadcaster, SyncError,
};
use crate::config::{NodeConfig, TransportKind};

/// Errors raised by node-level operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Node has no NODE_ID configured")]
    NoNodeId,
}

/// A running ledger node
#[derive(Debug)]
pub struct Node {
    node_id: Option<String>,
    ledger: Ledger,
    registry: Arc<NodeRegistry>,
    store: Arc<ReplicationStore>,
    broadcaster: SyncBroadcaster,
    // held from mining through broadcast so the own log keeps ledger order
    mine_lock: Mutex<()>,
}

impl Node {
    /// Assembles a node with an initialized ledger
    pub fn new(
        node_id: Option<String>,
        registry: Arc<NodeRegistry>,
        store: Arc<ReplicationStore>,
        transport: Arc<dyn PeerTransport>,
        peer_timeout: Duration,
    ) -> Result<Self, NodeError> {
        let ledger = Ledger::new();
        ledger.init_genesis()?;

        let broadcaster = SyncBroadcaster::new(registry.clone(), transport, peer_timeout);

        Ok(Node {
            node_id,
            ledger,
            registry,
            store,
            broadcaster,
            mine_lock: Mutex::new(()),
        })
    }

    /// Builds a node and its transport from the runtime configuration
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
        let registry = Arc::new(NodeRegistry::new(&config.nodes_file));
        let store = Arc::new(ReplicationStore::new(&config.data_dir));

        let transport: Arc<dyn PeerTransport> = match config.transport {
            TransportKind::Local => Arc::new(LocalTransport::new(store.clone())),
            TransportKind::Http => Arc::new(HttpTransport::new(config.peer_port, config.peer_timeout)?),
        };

        Self::new(config.node_id.clone(), registry, store, transport, config.peer_timeout)
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ReplicationStore {
        &self.store
    }

    /// Adds this node to the shared registry
    pub fn register(&self) -> Result<(), NodeError> {
        let node_id = self.node_id.as_deref().ok_or(NodeError::NoNodeId)?;
        self.registry.register(node_id)?;
        Ok(())
    }

    /// Payload used for blocks mined without caller-supplied data
    pub fn default_payload(&self) -> String {
        match &self.node_id {
            Some(id) => format!("Data for Node {}", id),
            None => "Data".to_string(),
        }
    }

    /// Mines a block, stores it in this node's own log and broadcasts it
    ///
    /// # Returns
    ///
    /// The new block with the per-peer broadcast outcomes
    ///
    /// Concurrent calls are serialized, so peers receive blocks in the order
    /// they were mined and a block never arrives before its predecessor.
    pub async fn mine_and_broadcast(&self, data: &str) -> Result<(Block, BroadcastReport), NodeError> {
        let _guard = self.mine_lock.lock().await;

        let block = self.ledger.mine(data)?;

        if let Some(node_id) = &self.node_id {
            self.store.append(node_id, &block)?;
        }

        let report = self
            .broadcaster
            .broadcast(&block, self.node_id.as_deref())
            .await?;

        Ok((block, report))
    }

    /// Verifies and stores a block pushed by another node
    pub fn accept_sync(&self, block: &Block) -> Result<(), NodeError> {
        let node_id = self.node_id.as_deref().ok_or(NodeError::NoNodeId)?;
        self.store.accept(node_id, block)?;
        Ok(())
    }

    /// The replicated log of the most recently registered peer
    pub fn primary_chain(&self) -> Result<Vec<Block>, NodeError> {
        let primary = self.registry.primary()?;
        Ok(self.store.read_all(&primary)?)
    }
}

/// Mines and broadcasts a block every `interval`, forever
///
/// Failures are logged and the loop moves on to the next tick.
pub async fn run_mining_loop(node: Arc<Node>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick fires immediately
    ticker.tick().await;

    info!(
        "Node {} is running...",
        node.node_id().unwrap_or("<anonymous>")
    );

    loop {
        ticker.tick().await;

        let data = node.default_payload();
        match node.mine_and_broadcast(&data).await {
            Ok((block, report)) => {
                info!(
                    "Mined block {} and synced to {}/{} peer(s)",
                    block.id,
                    report.delivered_count(),
                    report.outcomes.len()
                );
                if !report.is_complete() {
                    let missed: Vec<&str> = report.failures().map(|o| o.peer_id.as_str()).collect();
                    warn!("Block {} not delivered to {}", block.id, missed.join(", "));
                }
            }
            Err(err) => error!("Error mining or syncing block: {}", err),
        }
    }
}
