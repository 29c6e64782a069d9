use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::address::Address;
use super::block::Block;
use super::config::LedgerConfig;
use super::pow::{CancelToken, ProofOfWork, SealError};
use super::storage::{LedgerStore, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Mining was cancelled before the batch could be sealed")]
    Cancelled,
}

/// The system of record: an ordered block sequence plus the queue of
/// unconfirmed transactions.
///
/// The chain is never empty; index 0 is the genesis block. Shared state
/// lives behind mutexes, and the mine path swaps the queue out under its
/// lock so a submission arriving mid-mine is either in the sealed batch or
/// deferred to the next one.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of blocks
    chain: Arc<Mutex<Vec<Block>>>,

    /// Pending transactions waiting to be sealed into the next block
    pending: Arc<Mutex<Vec<Transaction>>>,

    /// Mining parameters
    config: LedgerConfig,

    /// Cancellation contract for the in-flight nonce search
    cancel: CancelToken,

    /// Optional durability for blocks and transactions
    store: Option<Arc<LedgerStore>>,
}

impl Ledger {
    /// Creates an in-memory ledger seeded with the genesis block.
    pub fn new(config: LedgerConfig) -> Self {
        Ledger {
            chain: Arc::new(Mutex::new(vec![Block::genesis()])),
            pending: Arc::new(Mutex::new(Vec::new())),
            config,
            cancel: CancelToken::new(),
            store: None,
        }
    }

    /// Creates a ledger backed by the given store, loading an existing
    /// chain or seeding a fresh genesis block.
    pub fn with_store(config: LedgerConfig, store: Arc<LedgerStore>) -> Result<Self, LedgerError> {
        let blocks = store.load_blocks()?;

        let chain = if blocks.is_empty() {
            info!("No existing chain in storage, creating genesis block");
            let genesis = Block::genesis();
            store.save_block(&genesis)?;
            store.flush()?;
            vec![genesis]
        } else {
            info!("Loaded chain of {} blocks from storage", blocks.len());
            blocks
        };

        Ok(Ledger {
            chain: Arc::new(Mutex::new(chain)),
            pending: Arc::new(Mutex::new(Vec::new())),
            config,
            cancel: CancelToken::new(),
            store: Some(store),
        })
    }

    /// The last block in the chain.
    pub fn last_block(&self) -> Block {
        let chain = self.chain.lock().unwrap();
        chain.last().unwrap().clone()
    }

    /// Validates inputs and appends a new pending transaction to the queue.
    ///
    /// `sender == receiver` is allowed; the system reward reuses a fixed
    /// sender sentinel. A rejected submission leaves no trace.
    pub fn submit(
        &self,
        sender: Address,
        receiver: Address,
        amount: f64,
        price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Transaction, TransactionError> {
        let transaction = Transaction::new(sender, receiver, amount, price, timestamp)?;
        self.pending.lock().unwrap().push(transaction.clone());
        Ok(transaction)
    }

    /// Seals the current pending batch, plus a reward transaction for the
    /// miner, into a new block.
    ///
    /// Returns `Ok(None)` when nothing is pending; that is the explicit
    /// nothing-to-do signal, not an error. Snapshots enter the candidate
    /// block already confirmed so the sealed hash covers their final state.
    /// If the nonce search is cancelled, the batch returns untouched to the
    /// head of the queue and `LedgerError::Cancelled` is reported: mining
    /// either fully completes or is a no-op.
    pub fn mine(&self, miner: &Address) -> Result<Option<Block>, LedgerError> {
        let batch = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut *pending)
        };

        let mut transactions: Vec<Transaction> = batch
            .iter()
            .cloned()
            .map(Transaction::into_confirmed)
            .collect();
        transactions.push(Transaction::reward(miner.clone(), self.config.reward).into_confirmed());

        let last = self.last_block();
        let mut block = Block::new(last.index + 1, transactions, last.hash);

        let pow = ProofOfWork::new(self.config.difficulty);
        match pow.seal(&mut block, &self.cancel) {
            Ok(proof) => {
                info!(
                    "Sealed block {} with proof {} ({} transactions)",
                    block.index,
                    proof,
                    block.transactions.len()
                );
            }
            Err(SealError::Cancelled) => {
                warn!(
                    "Mining cancelled, returning {} transactions to the queue",
                    batch.len()
                );
                let mut pending = self.pending.lock().unwrap();
                let deferred = std::mem::take(&mut *pending);
                *pending = batch;
                pending.extend(deferred);
                return Err(LedgerError::Cancelled);
            }
        }

        self.chain.lock().unwrap().push(block.clone());

        if let Some(store) = &self.store {
            store.save_block(&block)?;
            for transaction in &block.transactions {
                store.save_transaction(transaction)?;
            }
            store.flush()?;
        }

        Ok(Some(block))
    }

    /// Walks the chain checking, for every block after genesis, that the
    /// stored hash matches a fresh recomputation, that it links to its
    /// predecessor, and that it satisfies the difficulty predicate; then
    /// sweeps confirmed and pending transactions for duplicate ids.
    ///
    /// Read-only diagnostic: nothing is repaired.
    pub fn validate(&self) -> bool {
        let chain = self.chain.lock().unwrap();
        let pow = ProofOfWork::new(self.config.difficulty);

        for i in 1..chain.len() {
            let current = &chain[i];
            let previous = &chain[i - 1];

            if current.hash != current.compute_hash() {
                return false;
            }

            if current.previous_hash != previous.hash {
                return false;
            }

            if !pow.matches(&current.hash) {
                return false;
            }
        }

        let pending = self.pending.lock().unwrap();
        let mut seen = HashSet::new();
        let confirmed = chain.iter().flat_map(|block| block.transactions.iter());
        for transaction in confirmed.chain(pending.iter()) {
            if !seen.insert(transaction.id.as_str()) {
                return false;
            }
        }

        true
    }

    /// Every transaction where the address is sender or receiver, in
    /// chain-then-pending order.
    pub fn transactions_for(&self, address: &Address) -> Vec<Transaction> {
        let mut transactions = Vec::new();

        for block in self.chain.lock().unwrap().iter() {
            for transaction in &block.transactions {
                if transaction.involves(address) {
                    transactions.push(transaction.clone());
                }
            }
        }

        for transaction in self.pending.lock().unwrap().iter() {
            if transaction.involves(address) {
                transactions.push(transaction.clone());
            }
        }

        transactions
    }

    /// Net balance over confirmed transactions only: totals received minus
    /// totals sent.
    pub fn balance(&self, address: &Address) -> f64 {
        let chain = self.chain.lock().unwrap();
        let mut balance = 0.0;

        for block in chain.iter() {
            for transaction in &block.transactions {
                if transaction.receiver == *address {
                    balance += transaction.total;
                }
                if transaction.sender == *address {
                    balance -= transaction.total;
                }
            }
        }

        balance
    }

    /// Balance as it would read if every pending transaction were
    /// confirmed.
    pub fn projected_balance(&self, address: &Address) -> f64 {
        let mut balance = self.balance(address);

        for transaction in self.pending.lock().unwrap().iter() {
            if transaction.receiver == *address {
                balance += transaction.total;
            }
            if transaction.sender == *address {
                balance -= transaction.total;
            }
        }

        balance
    }

    /// Looks a transaction up by id, across blocks then the pending queue.
    pub fn find_transaction(&self, id: &str) -> Option<Transaction> {
        for block in self.chain.lock().unwrap().iter() {
            for transaction in &block.transactions {
                if transaction.id == id {
                    return Some(transaction.clone());
                }
            }
        }

        self.pending
            .lock()
            .unwrap()
            .iter()
            .find(|transaction| transaction.id == id)
            .cloned()
    }

    /// Full chain snapshot for external consumption.
    pub fn export(&self) -> Vec<Block> {
        self.chain.lock().unwrap().clone()
    }

    /// Snapshot of the unconfirmed transaction queue.
    pub fn pending(&self) -> Vec<Transaction> {
        self.pending.lock().unwrap().clone()
    }

    /// Abandons any in-flight nonce search. Used on shutdown.
    pub fn cancel_mining(&self) {
        self.cancel.cancel();
    }
}
