use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Sentinel previous-hash carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a sealed batch of transactions in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transaction snapshots included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work (nonce), established once during the nonce search
    pub proof: u64,

    /// Hash of this block, established once when the block is sealed
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hash: String,
}

impl Block {
    /// Creates a new unsealed candidate block.
    ///
    /// `proof` starts at zero and `hash` stays empty until the proof of
    /// work engine seals the block.
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            previous_hash,
            proof: 0,
            hash: String::new(),
        }
    }

    /// Creates the genesis block: index zero, no transactions, sentinel
    /// previous hash. Hashed directly, no proof of work.
    pub fn genesis() -> Self {
        let mut block = Block::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string());
        block.hash = block.compute_hash();
        block
    }

    /// Computes the SHA-256 hash of the block contents as lowercase hex.
    ///
    /// The digest covers `{index, timestamp, transactions, previous_hash,
    /// proof}` in canonical form: serde_json object maps are BTree-backed,
    /// so keys serialize in sorted order at every nesting level and the
    /// digest is reproducible for identical field values.
    pub fn compute_hash(&self) -> String {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "proof": self.proof,
        });

        let mut hasher = Sha256::new();
        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::address::Address;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new(
                Address("payer".to_string()),
                Address("payee".to_string()),
                10.0,
                0.5,
                None,
            )
            .unwrap(),
            Transaction::reward(Address("miner".to_string()), 1.0),
        ]
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();

        assert_eq!(genesis.index, 0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.proof, 0);
        assert_eq!(genesis.hash, genesis.compute_hash());
    }

    #[test]
    fn test_new_block_is_unsealed() {
        let block = Block::new(1, sample_transactions(), "previous_hash".to_string());

        assert_eq!(block.index, 1);
        assert_eq!(block.proof, 0);
        assert_eq!(block.previous_hash, "previous_hash");
        assert!(block.hash.is_empty());
    }

    #[test]
    fn test_compute_hash_is_deterministic() {
        let block = Block::new(1, sample_transactions(), "previous_hash".to_string());

        let hash = block.compute_hash();
        assert_eq!(hash.len(), 64); // SHA-256 hash is 64 characters in hex
        assert_eq!(hash, block.compute_hash());
    }

    #[test]
    fn test_hash_changes_when_contents_change() {
        let block = Block::new(1, sample_transactions(), "previous_hash".to_string());
        let original = block.compute_hash();

        let mut tampered = block.clone();
        tampered.transactions[0].amount = 99.0;
        assert_ne!(original, tampered.compute_hash());

        let mut tampered = block;
        tampered.proof += 1;
        assert_ne!(original, tampered.compute_hash());
    }
}
