use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use log::{debug, info};

use super::block::Block;
use super::hash::validate_link;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger has no genesis block")]
    NotInitialized,

    #[error("Ledger already has a genesis block")]
    AlreadyInitialized,

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

/// The local, in-memory sequence of blocks owned by a node process
///
/// Cloning a `Ledger` yields another handle onto the same chain. Every
/// operation takes the chain lock, so mining from the HTTP path and the
/// background loop is serialized.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    chain: Arc<Mutex<Vec<Block>>>,
}

impl Ledger {
    /// Creates an empty, uninitialized ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Block>>, LedgerError> {
        self.chain.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Inserts the genesis block into an empty ledger
    ///
    /// # Returns
    ///
    /// The genesis block, or `AlreadyInitialized` if the ledger is not empty
    pub fn init_genesis(&self) -> Result<Block, LedgerError> {
        let mut chain = self.lock()?;
        if !chain.is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }

        let genesis = Block::genesis();
        chain.push(genesis.clone());
        info!("Initialized ledger with genesis block {}", genesis.hash);

        Ok(genesis)
    }

    /// Mines a new block on top of the current tip
    ///
    /// # Arguments
    ///
    /// * `data` - The payload of the new block
    ///
    /// # Returns
    ///
    /// The appended block, or `NotInitialized` before genesis
    pub fn mine(&self, data: &str) -> Result<Block, LedgerError> {
        let mut chain = self.lock()?;
        let tip = chain.last().ok_or(LedgerError::NotInitialized)?;

        let block = Block::new(tip.hash.clone(), data.to_string());
        chain.push(block.clone());
        debug!("Mined block {} at height {}", block.id, chain.len() - 1);

        Ok(block)
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Result<Block, LedgerError> {
        self.lock()?
            .last()
            .cloned()
            .ok_or(LedgerError::NotInitialized)
    }

    /// Gets a copy of the whole chain, genesis first
    pub fn get_chain(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.lock()?.clone())
    }

    /// Number of blocks in the ledger, genesis included
    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.len())
    }

    /// true until the genesis block has been created
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.lock()?.is_empty())
    }

    /// Validates the ledger
    ///
    /// # Returns
    ///
    /// true if the first block is the genesis block and every later block
    /// carries a correct hash linked onto its predecessor
    pub fn is_valid(&self) -> Result<bool, LedgerError> {
        let chain = self.lock()?;

        match chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => return Ok(false),
        }

        let valid = chain
            .windows(2)
            .all(|pair| pair[1].has_valid_hash() && validate_link(&pair[1], &pair[0]));

        Ok(valid)
    }
}
