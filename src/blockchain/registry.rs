use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;

use super::storage::{read_json, validate_peer_id, write_json_atomic, StorageError};

/// Durable list of known peer ids, backed by a shared JSON file
///
/// Registration is a full read-modify-write of the file. Writers inside one
/// process are serialized; separate processes registering at the same moment
/// can still overwrite each other.
#[derive(Debug)]
pub struct NodeRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl NodeRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        NodeRegistry {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the registered peer ids
    ///
    /// # Returns
    ///
    /// The ids in registration order. A missing file is created empty.
    pub fn load(&self) -> Result<Vec<String>, StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.read_or_create()
    }

    fn read_or_create(&self) -> Result<Vec<String>, StorageError> {
        match read_json::<Vec<String>>(&self.path)? {
            Some(nodes) => Ok(nodes),
            None => {
                write_json_atomic(&self.path, &Vec::<String>::new())?;
                info!("Created empty node registry at {}", self.path.display());
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, nodes: &[String]) -> Result<(), StorageError> {
        write_json_atomic(&self.path, nodes)
    }

    /// Appends a peer id to the registry
    ///
    /// Registering the same id twice records it twice.
    pub fn register(&self, peer_id: &str) -> Result<(), StorageError> {
        validate_peer_id(peer_id)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let mut nodes = self.read_or_create()?;
        nodes.push(peer_id.to_string());
        self.save(&nodes)?;

        info!("Registered node {} ({} entries)", peer_id, nodes.len());
        Ok(())
    }

    /// The most recently registered peer id
    pub fn primary(&self) -> Result<String, StorageError> {
        self.load()?
            .pop()
            .ok_or_else(|| StorageError::NotFound("no peers registered".to_string()))
    }
}
