// Blockchain module
//
// This module contains the replicated ledger core:
// - Block structure and hash chaining
// - The local ledger
// - The node registry and per-peer replication store
// - Block propagation to peers

pub mod block;
pub mod chain;
pub mod hash;
pub mod registry;
pub mod storage;
pub mod sync;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, LedgerError};
pub use registry::NodeRegistry;
pub use storage::{ReplicationStore, StorageError};
pub use sync::{BroadcastReport, HttpTransport, LocalTransport, PeerOutcome, PeerTransport, SyncBroadcaster, SyncError};
