/// Mining parameters for the ledger.
///
/// Kept out of the core types so tests can run against a low difficulty.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Number of leading zero hex characters a sealed block hash must carry.
    pub difficulty: usize,

    /// Energy units granted to the miner per sealed block.
    pub reward: f64,
}

impl LedgerConfig {
    pub fn new(difficulty: usize, reward: f64) -> Self {
        LedgerConfig { difficulty, reward }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: 4,
            reward: 1.0,
        }
    }
}
