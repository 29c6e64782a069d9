use log::warn;
use sled::{Db, Tree};
use thiserror::Error;

use std::path::Path;

use super::block::Block;
use super::participant::Profile;
use super::transaction::Transaction;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// sled-backed durability for the chain, its transactions, and the
/// participant registry.
///
/// Opt-in: the in-memory constructors never touch it. Blocks are keyed by
/// hash and re-ordered by index on load.
pub struct LedgerStore {
    db: Db,

    /// Tree for sealed blocks
    blocks: Tree,

    /// Tree for confirmed transactions, keyed by id
    transactions: Tree,

    /// Tree for participant profiles, keyed by address
    profiles: Tree,

    /// Tree for chain-tip metadata
    metadata: Tree,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore").finish()
    }
}

impl LedgerStore {
    /// Opens (or creates) a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let blocks = db.open_tree("blocks")?;
        let transactions = db.open_tree("transactions")?;
        let profiles = db.open_tree("profiles")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks,
            transactions,
            profiles,
            metadata,
        })
    }

    /// Saves a sealed block and updates the chain-tip metadata.
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let key = block.hash.as_bytes();
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.blocks.insert(key, value)?;

        self.metadata.insert("latest_block_hash", key)?;

        let height = bincode::serialize(&block.index)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.metadata.insert("block_height", height)?;

        Ok(())
    }

    /// Loads every stored block, ordered by index.
    ///
    /// An empty store yields an empty vector. Blocks that fail to decode
    /// are skipped with a warning, unless nothing decodes at all.
    pub fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();
        let mut decode_errors = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            match bincode::deserialize::<Block>(&value) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    let key = String::from_utf8_lossy(&key).to_string();
                    decode_errors.push(format!("block {}: {}", key, e));
                }
            }
        }

        if !decode_errors.is_empty() {
            if blocks.is_empty() {
                return Err(StorageError::Deserialization(format!(
                    "no block could be decoded: {}",
                    decode_errors.join(", ")
                )));
            }
            warn!("Some blocks could not be decoded: {}", decode_errors.join(", "));
        }

        blocks.sort_by_key(|block| block.index);

        Ok(blocks)
    }

    /// Saves a confirmed transaction, keyed by id.
    pub fn save_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
        let key = transaction.id.as_bytes();
        let value = bincode::serialize(transaction)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.transactions.insert(key, value)?;
        Ok(())
    }

    /// Saves a participant profile, keyed by address.
    pub fn save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        let key = profile.address.0.as_bytes();
        let value = bincode::serialize(profile)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.profiles.insert(key, value)?;
        Ok(())
    }

    /// Loads every stored participant profile.
    ///
    /// Profiles that fail to decode are skipped with a warning.
    pub fn load_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        let mut profiles = Vec::new();

        for result in self.profiles.iter() {
            let (key, value) = result?;
            match bincode::deserialize::<Profile>(&value) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    warn!(
                        "Skipping undecodable profile {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    );
                }
            }
        }

        Ok(profiles)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
