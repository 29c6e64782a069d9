use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::block::Block;

/// Error raised when a nonce search is abandoned.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("Nonce search cancelled before a valid proof was found")]
    Cancelled,
}

/// Signals an in-flight nonce search to stop.
///
/// Cloned handles share the same flag; tripping any of them abandons the
/// search at its next iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Brute-force nonce search sealing blocks against a fixed difficulty
/// target.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: String,
}

impl ProofOfWork {
    /// Creates an engine requiring `difficulty` leading zero hex characters
    /// in the sealed hash.
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork {
            target: "0".repeat(difficulty),
        }
    }

    /// The difficulty predicate: whether a hash has the required prefix.
    pub fn matches(&self, hash: &str) -> bool {
        hash.starts_with(&self.target)
    }

    /// Seals the block: increments `proof` from zero, recomputing the hash,
    /// until the prefix matches the target.
    ///
    /// Blocking and CPU-bound; the calling thread is unavailable until a
    /// nonce is found. The token is checked each attempt so a shutdown can
    /// abandon the search, leaving the block unsealed.
    pub fn seal(&self, block: &mut Block, cancel: &CancelToken) -> Result<u64, SealError> {
        block.proof = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SealError::Cancelled);
            }

            let hash = block.compute_hash();
            if self.matches(&hash) {
                block.hash = hash;
                return Ok(block.proof);
            }

            block.proof += 1;
        }
    }
}
