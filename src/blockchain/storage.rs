use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::block::Block;
use super::hash::validate_link;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid peer id: {0:?}")]
    InvalidPeerId(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Checks that a peer id can safely name a file in the data directory
pub fn validate_peer_id(peer_id: &str) -> Result<(), StorageError> {
    let invalid = peer_id.is_empty()
        || peer_id.starts_with('.')
        || peer_id.contains(['/', '\\', '\0']);

    if invalid {
        return Err(StorageError::InvalidPeerId(peer_id.to_string()));
    }
    Ok(())
}

/// Reads and parses a JSON file
///
/// # Returns
///
/// `Ok(None)` when the file does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };

    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Replaces a JSON file atomically
///
/// The value is written to a uniquely named temp file in the target's
/// directory, synced, then renamed over the target. Concurrent writers never
/// share a temp file and readers never observe a half-written file.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StorageError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Durable per-peer block logs, one `<peer_id>.json` file per peer
pub struct ReplicationStore {
    /// Directory holding the peer files
    data_dir: PathBuf,

    /// One lock per peer file, guarding its read-modify-write
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ReplicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationStore")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl ReplicationStore {
    /// Creates a store rooted at `data_dir`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        ReplicationStore {
            data_dir: data_dir.as_ref().to_path_buf(),
            locks: DashMap::new(),
        }
    }

    /// Path of the file holding `peer_id`'s log
    pub fn peer_path(&self, peer_id: &str) -> Result<PathBuf, StorageError> {
        validate_peer_id(peer_id)?;
        Ok(self.data_dir.join(format!("{}.json", peer_id)))
    }

    fn lock_for(&self, peer_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(peer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Upserts a block into a peer's log
    ///
    /// Any stored block with the same id is removed before the block is
    /// appended, so re-delivering a block leaves the log unchanged.
    ///
    /// # Arguments
    ///
    /// * `peer_id` - The peer whose log receives the block
    /// * `block` - The block to store
    pub fn append(&self, peer_id: &str, block: &Block) -> Result<(), StorageError> {
        let path = self.peer_path(peer_id)?;
        let lock = self.lock_for(peer_id);
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let blocks = read_json::<Vec<Block>>(&path)?.unwrap_or_default();
        self.upsert(&path, blocks, block)?;

        debug!("Stored block {} for peer {}", block.id, peer_id);
        Ok(())
    }

    /// Verifies a block received from another node, then upserts it
    ///
    /// The block must carry a correct hash and link onto either the genesis
    /// block or a block already in the peer's log.
    pub fn accept(&self, peer_id: &str, block: &Block) -> Result<(), StorageError> {
        if !block.has_valid_hash() {
            return Err(StorageError::InvalidBlock(format!(
                "block {} hash does not match its contents",
                block.id
            )));
        }

        let path = self.peer_path(peer_id)?;
        let lock = self.lock_for(peer_id);
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let blocks = read_json::<Vec<Block>>(&path)?.unwrap_or_default();

        let genesis = Block::genesis();
        let linked = validate_link(block, &genesis)
            || blocks.iter().any(|known| validate_link(block, known));
        if !linked {
            return Err(StorageError::InvalidBlock(format!(
                "block {} has unknown predecessor {}",
                block.id, block.prev_hash
            )));
        }

        self.upsert(&path, blocks, block)?;

        info!("Accepted block {} for peer {}", block.id, peer_id);
        Ok(())
    }

    fn upsert(&self, path: &Path, mut blocks: Vec<Block>, block: &Block) -> Result<(), StorageError> {
        blocks.retain(|existing| existing.id != block.id);
        blocks.push(block.clone());
        write_json_atomic(path, &blocks)
    }

    /// Reads a peer's whole log
    ///
    /// # Returns
    ///
    /// The stored blocks in insertion order, or `NotFound` if the peer has no file
    pub fn read_all(&self, peer_id: &str) -> Result<Vec<Block>, StorageError> {
        let path = self.peer_path(peer_id)?;
        let lock = self.lock_for(peer_id);
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        read_json(&path)?.ok_or_else(|| {
            StorageError::NotFound(format!("no replicated blocks for peer {}", peer_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, ReplicationStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ReplicationStore::new(temp_dir.path().join("data"));
        (temp_dir, store)
    }

    #[test]
    fn test_append_creates_peer_file() {
        let (_dir, store) = setup_store();
        let block = Block::new(Block::genesis().hash, "a".to_string());

        store.append("node-1", &block).unwrap();

        assert!(store.peer_path("node-1").unwrap().exists());
        assert_eq!(store.read_all("node-1").unwrap(), vec![block]);
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let (_dir, store) = setup_store();
        let a = Block::new(Block::genesis().hash, "a".to_string());
        let b = Block::new(a.hash.clone(), "b".to_string());

        store.append("node-1", &a).unwrap();
        store.append("node-1", &b).unwrap();

        assert_eq!(store.read_all("node-1").unwrap(), vec![a, b]);
    }

    #[test]
    fn test_append_is_idempotent() {
        let (_dir, store) = setup_store();
        let a = Block::new(Block::genesis().hash, "a".to_string());
        let b = Block::new(a.hash.clone(), "b".to_string());
        store.append("node-1", &a).unwrap();
        store.append("node-1", &b).unwrap();

        store.append("node-1", &b).unwrap();

        assert_eq!(store.read_all("node-1").unwrap(), vec![a, b]);
    }

    #[test]
    fn test_append_replaces_block_with_same_id() {
        let (_dir, store) = setup_store();
        let a = Block::new(Block::genesis().hash, "a".to_string());
        let b = Block::new(a.hash.clone(), "b".to_string());
        store.append("node-1", &a).unwrap();
        store.append("node-1", &b).unwrap();

        let mut replacement = Block::new(Block::genesis().hash, "a2".to_string());
        replacement.id = a.id.clone();
        store.append("node-1", &replacement).unwrap();

        // the replaced block moves to the end of the log
        assert_eq!(store.read_all("node-1").unwrap(), vec![b, replacement]);
    }

    #[test]
    fn test_read_all_missing_peer() {
        let (_dir, store) = setup_store();

        assert!(matches!(
            store.read_all("nobody"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_all_corrupt_file() {
        let (_dir, store) = setup_store();
        let path = store.peer_path("node-1").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            store.read_all("node-1"),
            Err(StorageError::Serialization(_))
        ));
        assert!(store.append("node-1", &Block::genesis()).is_err());
    }

    #[test]
    fn test_rejects_path_like_peer_ids() {
        let (_dir, store) = setup_store();

        for bad in ["", "../escape", "a/b", ".hidden", "a\\b"] {
            assert!(matches!(
                store.append(bad, &Block::genesis()),
                Err(StorageError::InvalidPeerId(_))
            ));
        }
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let (dir, store) = setup_store();
        store.append("node-1", &Block::genesis()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["node-1.json".to_string()]);
    }

    #[test]
    fn test_accept_block_linked_to_genesis() {
        let (_dir, store) = setup_store();
        let block = Block::new(Block::genesis().hash, "first".to_string());

        store.accept("node-2", &block).unwrap();

        assert_eq!(store.read_all("node-2").unwrap(), vec![block]);
    }

    #[test]
    fn test_accept_block_linked_to_known_block() {
        let (_dir, store) = setup_store();
        let a = Block::new(Block::genesis().hash, "first".to_string());
        let b = Block::new(a.hash.clone(), "second".to_string());

        store.accept("node-2", &a).unwrap();
        store.accept("node-2", &b).unwrap();
        store.accept("node-2", &b).unwrap();

        assert_eq!(store.read_all("node-2").unwrap(), vec![a, b]);
    }

    #[test]
    fn test_accept_rejects_bad_hash() {
        let (_dir, store) = setup_store();
        let mut block = Block::new(Block::genesis().hash, "first".to_string());
        block.hash = "0".repeat(64);

        assert!(matches!(
            store.accept("node-2", &block),
            Err(StorageError::InvalidBlock(_))
        ));
        assert!(store.read_all("node-2").is_err());
    }

    #[test]
    fn test_accept_rejects_unknown_predecessor() {
        let (_dir, store) = setup_store();
        let orphan = Block::new("f".repeat(64), "orphan".to_string());

        assert!(matches!(
            store.accept("node-2", &orphan),
            Err(StorageError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_stores_sharing_a_directory_never_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let peers: Vec<String> = (0..10).map(|i| format!("node-{}", i)).collect();

        // two stores on one directory behave like two processes: separate locks
        let handles: Vec<_> = (0..2)
            .map(|writer| {
                let store = ReplicationStore::new(&data_dir);
                let peers = peers.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        for peer in &peers {
                            let block = Block::new(
                                Block::genesis().hash,
                                format!("writer {} round {}", writer, round),
                            );
                            store.append(peer, &block).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reader = ReplicationStore::new(&data_dir);
        for peer in &peers {
            let blocks = reader.read_all(peer).unwrap();
            assert!(!blocks.is_empty());
            assert!(blocks.iter().all(|b| b.has_valid_hash()));
        }

        let mut names: Vec<_> = fs::read_dir(&data_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        let mut expected: Vec<_> = peers.iter().map(|p| format!("{}.json", p)).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let (_dir, store) = setup_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let block = Block::new(Block::genesis().hash, format!("block {}", i));
                    store.append("node-1", &block).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read_all("node-1").unwrap().len(), 8);
    }
}
