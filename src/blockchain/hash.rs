//! Hash chaining primitives.

use sha2::{Digest, Sha256};

use super::block::Block;

/// Computes the integrity hash of a block from its chained fields
///
/// The inputs are concatenated in the order `prev_hash`, `timestamp`, `data`
/// and digested with SHA-256.
///
/// # Returns
///
/// The hash as a lowercase hexadecimal string (64 characters)
pub fn compute_hash(prev_hash: &str, timestamp: &str, data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(data.as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Returns true iff `candidate` links onto `predecessor`
pub fn validate_link(candidate: &Block, predecessor: &Block) -> bool {
    candidate.prev_hash == predecessor.hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_is_deterministic() {
        let a = compute_hash("prev", "2024-03-21 10:00:00", "data");
        let b = compute_hash("prev", "2024-03-21 10:00:00", "data");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_compute_hash_changes_with_each_input() {
        let base = compute_hash("prev", "2024-03-21 10:00:00", "data");

        assert_ne!(base, compute_hash("prev2", "2024-03-21 10:00:00", "data"));
        assert_ne!(base, compute_hash("prev", "2024-03-21 10:00:01", "data"));
        assert_ne!(base, compute_hash("prev", "2024-03-21 10:00:00", "data2"));
    }

    #[test]
    fn test_compute_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            compute_hash("a", "b", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_link() {
        let genesis = Block::genesis();
        let next = Block::new(genesis.hash.clone(), "next".to_string());
        let stranger = Block::new("elsewhere".to_string(), "next".to_string());

        assert!(validate_link(&next, &genesis));
        assert!(!validate_link(&stranger, &genesis));
        assert!(!validate_link(&genesis, &next));
    }
}
