use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::hash::compute_hash;

/// Timestamp layout used for every block (second granularity, UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed genesis inputs, shared by every node
pub const GENESIS_TIMESTAMP: &str = "2024-03-21 00:00:00";
pub const GENESIS_DATA: &str = "Genesis Block";

/// Represents a block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Globally unique identifier of the block
    #[schema(example = "7b0c1f52-6d7e-4a51-9a5e-2f4f1c8e3b10")]
    pub id: String,

    /// Creation time
    #[schema(example = "2024-03-21 12:00:00")]
    pub timestamp: String,

    /// Opaque payload
    pub data: String,

    /// Hash of the predecessor block (empty for genesis)
    pub prev_hash: String,

    /// SHA-256 hash over prev_hash, timestamp and data
    pub hash: String,
}

impl Block {
    /// Creates a new block linked to `prev_hash`
    ///
    /// # Arguments
    ///
    /// * `prev_hash` - The hash of the current tip
    /// * `data` - The payload to record
    ///
    /// # Returns
    ///
    /// A new Block with a fresh id, the current timestamp and its computed hash
    pub fn new(prev_hash: String, data: String) -> Self {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_parts(Uuid::new_v4().to_string(), timestamp, data, prev_hash)
    }

    /// Creates the genesis block. Every call yields an identical block.
    pub fn genesis() -> Self {
        Self::with_parts(
            Uuid::nil().to_string(),
            GENESIS_TIMESTAMP.to_string(),
            GENESIS_DATA.to_string(),
            String::new(),
        )
    }

    fn with_parts(id: String, timestamp: String, data: String, prev_hash: String) -> Self {
        let hash = compute_hash(&prev_hash, &timestamp, &data);

        Block {
            id,
            timestamp,
            data,
            prev_hash,
            hash,
        }
    }

    /// Recomputes the hash from the block's own fields
    pub fn calculate_hash(&self) -> String {
        compute_hash(&self.prev_hash, &self.timestamp, &self.data)
    }

    /// Whether the stored hash matches the block contents
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block() {
        let block = Block::new("previous_hash".to_string(), "payload".to_string());

        assert_eq!(block.prev_hash, "previous_hash");
        assert_eq!(block.data, "payload");
        assert_eq!(block.hash.len(), 64);
        assert!(block.has_valid_hash());
        assert!(Uuid::parse_str(&block.id).is_ok());
        assert!(chrono::NaiveDateTime::parse_from_str(&block.timestamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_block_ids_are_unique() {
        let a = Block::new("h".to_string(), "same".to_string());
        let b = Block::new("h".to_string(), "same".to_string());

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_genesis_is_reproducible() {
        let a = Block::genesis();
        let b = Block::genesis();

        assert_eq!(a, b);
        assert_eq!(a.prev_hash, "");
        assert_eq!(a.data, GENESIS_DATA);
        assert_eq!(a.hash, compute_hash("", GENESIS_TIMESTAMP, GENESIS_DATA));
    }

    #[test]
    fn test_tampered_block_fails_hash_check() {
        let mut block = Block::new("prev".to_string(), "original".to_string());
        block.data = "forged".to_string();

        assert!(!block.has_valid_hash());
    }

    #[test]
    fn test_json_field_names() {
        let block = Block::genesis();
        let value = serde_json::to_value(&block).unwrap();

        assert!(value.get("prevHash").is_some());
        assert!(value.get("prev_hash").is_none());
        assert_eq!(value["id"], Uuid::nil().to_string());
    }
}
