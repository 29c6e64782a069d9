use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::address::Address;

/// Energy source tag applied when the caller does not supply one.
pub const DEFAULT_ENERGY_TYPE: &str = "solar";

/// Errors raised when transaction inputs are rejected at the submission
/// boundary. A rejected transaction never enters the pending queue.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(f64),

    #[error("Price must not be negative, got {0}")]
    NegativePrice(f64),
}

/// Lifecycle state of a transaction.
///
/// Transitions exactly once, pending to confirmed, when the transaction is
/// included in a sealed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
}

/// Represents one energy transfer between two addresses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Address the traded value is debited from: the buyer in a
    /// participant trade, or the system sentinel for rewards
    pub sender: Address,

    /// Address the traded value is credited to: the seller in a
    /// participant trade, or the miner for rewards
    pub receiver: Address,

    /// Amount of energy in kWh
    pub amount: f64,

    /// Price per kWh
    pub price: f64,

    /// Amount times price, rounded to two decimals, fixed at creation
    pub total: f64,

    /// When the transaction occurred
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Energy source tag
    pub energy_type: String,

    /// Lifecycle state
    pub status: TxStatus,
}

/// Rounds a monetary value to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Transaction {
    /// Creates a new pending transaction.
    ///
    /// Validates `amount > 0` and `price >= 0`. Sender and receiver may be
    /// equal; reward transactions reuse the system sentinel as sender.
    pub fn new(
        sender: Address,
        receiver: Address,
        amount: f64,
        price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self, TransactionError> {
        if amount <= 0.0 {
            return Err(TransactionError::NonPositiveAmount(amount));
        }

        if price < 0.0 {
            return Err(TransactionError::NegativePrice(price));
        }

        Ok(Transaction {
            id: Uuid::new_v4().simple().to_string(),
            sender,
            receiver,
            amount,
            price,
            total: round2(amount * price),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            energy_type: DEFAULT_ENERGY_TYPE.to_string(),
            status: TxStatus::Pending,
        })
    }

    /// Creates the mining reward granted when a block is sealed.
    pub fn reward(miner: Address, amount: f64) -> Self {
        Transaction {
            id: Uuid::new_v4().simple().to_string(),
            sender: Address::system(),
            receiver: miner,
            amount,
            price: 0.0,
            total: 0.0,
            timestamp: Utc::now(),
            energy_type: DEFAULT_ENERGY_TYPE.to_string(),
            status: TxStatus::Pending,
        }
    }

    /// Whether this transaction was issued by the system rather than traded
    /// between participants.
    pub fn is_system_reward(&self) -> bool {
        self.sender.is_system()
    }

    /// Whether the given address is the sender or the receiver.
    pub fn involves(&self, address: &Address) -> bool {
        self.sender == *address || self.receiver == *address
    }

    /// Snapshot of this transaction as it appears inside a sealed block.
    pub(crate) fn into_confirmed(mut self) -> Self {
        self.status = TxStatus::Confirmed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address(s.to_string())
    }

    #[test]
    fn test_new_transaction() {
        let transaction =
            Transaction::new(addr("payer"), addr("payee"), 10.0, 0.5, None).unwrap();

        assert_eq!(transaction.sender, addr("payer"));
        assert_eq!(transaction.receiver, addr("payee"));
        assert_eq!(transaction.amount, 10.0);
        assert_eq!(transaction.price, 0.5);
        assert_eq!(transaction.total, 5.0);
        assert_eq!(transaction.energy_type, DEFAULT_ENERGY_TYPE);
        assert_eq!(transaction.status, TxStatus::Pending);
        assert!(!transaction.id.is_empty());
        assert!(!transaction.id.contains('-'));
    }

    #[test]
    fn test_total_is_rounded_to_two_decimals() {
        let transaction =
            Transaction::new(addr("payer"), addr("payee"), 8.3, 0.1, None).unwrap();
        assert_eq!(transaction.total, 0.83);

        let transaction =
            Transaction::new(addr("payer"), addr("payee"), 10.5, 0.12, None).unwrap();
        assert_eq!(transaction.total, 1.26);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let result = Transaction::new(addr("payer"), addr("payee"), 0.0, 0.5, None);
        assert!(matches!(result, Err(TransactionError::NonPositiveAmount(_))));

        let result = Transaction::new(addr("payer"), addr("payee"), -1.0, 0.5, None);
        assert!(matches!(result, Err(TransactionError::NonPositiveAmount(_))));

        let result = Transaction::new(addr("payer"), addr("payee"), 1.0, -0.5, None);
        assert!(matches!(result, Err(TransactionError::NegativePrice(_))));
    }

    #[test]
    fn test_reward_transaction() {
        let reward = Transaction::reward(addr("miner"), 1.0);

        assert!(reward.is_system_reward());
        assert_eq!(reward.receiver, addr("miner"));
        assert_eq!(reward.amount, 1.0);
        assert_eq!(reward.price, 0.0);
        assert_eq!(reward.total, 0.0);
        assert_eq!(reward.status, TxStatus::Pending);
    }

    #[test]
    fn test_involves() {
        let transaction =
            Transaction::new(addr("payer"), addr("payee"), 1.0, 1.0, None).unwrap();

        assert!(transaction.involves(&addr("payer")));
        assert!(transaction.involves(&addr("payee")));
        assert!(!transaction.involves(&addr("other")));
    }
}
