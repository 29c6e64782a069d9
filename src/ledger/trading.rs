use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::{Arc, Mutex};

use super::address::{derive_address, Address};
use super::block::Block;
use super::chain::{Ledger, LedgerError};
use super::config::LedgerConfig;
use super::participant::Profile;
use super::storage::LedgerStore;
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during trading operations
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Unknown address: {0}")]
    UnknownAddress(Address),

    #[error("Address collision for participant {0}: already registered this second")]
    AddressCollision(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of a settle call
#[derive(Debug)]
pub enum SettleOutcome {
    /// A block was sealed from the pending batch.
    Sealed {
        block: Block,
        transaction_count: usize,
    },

    /// Nothing was pending; the chain is unchanged.
    NoPending,
}

/// Aggregated statistics over confirmed participant-to-participant trades
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarketStats {
    /// Total energy traded, in kWh
    pub total_energy_traded: f64,

    /// Total value traded
    pub total_value_traded: f64,

    /// Number of confirmed trades
    pub transaction_count: usize,

    /// Value per energy unit; zero when no energy has been traded
    pub average_price: f64,

    /// Number of registered participants
    pub active_participants: usize,

    /// Number of unconfirmed transactions
    pub pending_count: usize,
}

/// Rounds to the given number of decimal places.
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Participant registry and convenience orchestration layered above the
/// ledger.
///
/// Owns the registry; all transaction and chain mutation is delegated to
/// the ledger. Constructed explicitly and passed by handle to whatever
/// layer needs it; clones share the same state.
#[derive(Debug, Clone)]
pub struct TradingService {
    ledger: Ledger,

    /// Registered participants, keyed by derived address
    profiles: Arc<DashMap<Address, Profile>>,

    /// Addresses in registration order; the miner is the first entry
    roster: Arc<Mutex<Vec<Address>>>,

    store: Option<Arc<LedgerStore>>,
}

impl TradingService {
    /// Creates a service over a fresh in-memory ledger.
    pub fn new(config: LedgerConfig) -> Self {
        TradingService {
            ledger: Ledger::new(config),
            profiles: Arc::new(DashMap::new()),
            roster: Arc::new(Mutex::new(Vec::new())),
            store: None,
        }
    }

    /// Creates a service with sled-backed durability for both the chain and
    /// the registry.
    pub fn with_store(config: LedgerConfig, store: Arc<LedgerStore>) -> Result<Self, LedgerError> {
        let ledger = Ledger::with_store(config, store.clone())?;

        let profiles = Arc::new(DashMap::new());
        let mut roster = Vec::new();

        let mut loaded = store.load_profiles()?;
        loaded.sort_by_key(|profile| profile.registered_at);
        for profile in loaded {
            roster.push(profile.address.clone());
            profiles.insert(profile.address.clone(), profile);
        }

        if !roster.is_empty() {
            info!("Loaded {} participants from storage", roster.len());
        }

        Ok(TradingService {
            ledger,
            profiles,
            roster: Arc::new(Mutex::new(roster)),
            store: Some(store),
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Registers a participant under an address derived from the external
    /// id and the registration instant (second granularity).
    ///
    /// Fails with `AddressCollision` when the derived address is already in
    /// the registry, which happens only for a same-second duplicate
    /// registration; the existing entry is left untouched.
    pub fn register(
        &self,
        external_id: &str,
        name: &str,
        energy_type: &str,
    ) -> Result<Profile, TradingError> {
        self.register_at(external_id, name, energy_type, Utc::now())
    }

    fn register_at(
        &self,
        external_id: &str,
        name: &str,
        energy_type: &str,
        registered_at: DateTime<Utc>,
    ) -> Result<Profile, TradingError> {
        let address = derive_address(external_id, registered_at);

        if self.profiles.contains_key(&address) {
            return Err(TradingError::AddressCollision(external_id.to_string()));
        }

        let profile = Profile::new(
            external_id.to_string(),
            name.to_string(),
            energy_type.to_string(),
            address.clone(),
            registered_at,
        );

        self.persist_profile(&profile)?;
        self.profiles.insert(address.clone(), profile.clone());
        self.roster.lock().unwrap().push(address);

        info!("Registered participant {} ({})", profile.name, profile.address);
        Ok(profile)
    }

    /// Submits a trade between two registered participants and updates
    /// their cumulative energy counters.
    ///
    /// The recorded value transfer runs buyer to seller: the buyer is
    /// debited the trade total, the seller is credited. Both addresses are
    /// checked before any side effect: an unknown party leaves the queue
    /// and the counters untouched.
    pub fn trade(
        &self,
        seller: &Address,
        buyer: &Address,
        amount: f64,
        price: f64,
    ) -> Result<Transaction, TradingError> {
        if !self.profiles.contains_key(seller) {
            return Err(TradingError::UnknownAddress(seller.clone()));
        }
        if !self.profiles.contains_key(buyer) {
            return Err(TradingError::UnknownAddress(buyer.clone()));
        }

        let transaction = self
            .ledger
            .submit(buyer.clone(), seller.clone(), amount, price, None)?;

        if let Some(mut profile) = self.profiles.get_mut(seller) {
            profile.energy_produced += amount;
            self.persist_profile(&profile)?;
        }
        if let Some(mut profile) = self.profiles.get_mut(buyer) {
            profile.energy_consumed += amount;
            self.persist_profile(&profile)?;
        }

        Ok(transaction)
    }

    /// Seals the pending batch, crediting the reward to the first
    /// registered participant, or to the system sentinel if nobody has
    /// registered yet.
    pub fn settle(&self) -> Result<SettleOutcome, TradingError> {
        let miner = self
            .roster
            .lock()
            .unwrap()
            .first()
            .cloned()
            .unwrap_or_else(Address::system);

        match self.ledger.mine(&miner)? {
            Some(block) => Ok(SettleOutcome::Sealed {
                transaction_count: block.transactions.len(),
                block,
            }),
            None => Ok(SettleOutcome::NoPending),
        }
    }

    /// Aggregates confirmed trades where both parties are participants,
    /// excluding system reward transactions.
    pub fn market_stats(&self) -> MarketStats {
        let mut total_energy = 0.0;
        let mut total_value = 0.0;
        let mut transaction_count = 0;

        for block in self.ledger.export() {
            for transaction in &block.transactions {
                if !transaction.is_system_reward() && !transaction.receiver.is_system() {
                    total_energy += transaction.amount;
                    total_value += transaction.total;
                    transaction_count += 1;
                }
            }
        }

        let average_price = if total_energy > 0.0 {
            total_value / total_energy
        } else {
            0.0
        };

        MarketStats {
            total_energy_traded: round_to(total_energy, 2),
            total_value_traded: round_to(total_value, 2),
            transaction_count,
            average_price: round_to(average_price, 4),
            active_participants: self.profiles.len(),
            pending_count: self.ledger.pending().len(),
        }
    }

    /// Finds a profile by external participant id.
    pub fn profile_of(&self, participant_id: &str) -> Option<Profile> {
        self.profiles
            .iter()
            .find(|entry| entry.external_id == participant_id)
            .map(|entry| entry.value().clone())
    }

    /// Confirmed balance for a participant, by external id.
    pub fn balance_of(&self, participant_id: &str) -> Option<f64> {
        self.profile_of(participant_id)
            .map(|profile| self.ledger.balance(&profile.address))
    }

    /// Balance including pending transactions, by external id.
    pub fn projected_balance_of(&self, participant_id: &str) -> Option<f64> {
        self.profile_of(participant_id)
            .map(|profile| self.ledger.projected_balance(&profile.address))
    }

    /// Every transaction involving a participant, by external id.
    pub fn transactions_of(&self, participant_id: &str) -> Option<Vec<Transaction>> {
        self.profile_of(participant_id)
            .map(|profile| self.ledger.transactions_for(&profile.address))
    }

    /// Registered participants in registration order.
    pub fn participants(&self) -> Vec<Profile> {
        let roster = self.roster.lock().unwrap();
        roster
            .iter()
            .filter_map(|address| self.profiles.get(address).map(|entry| entry.value().clone()))
            .collect()
    }

    pub fn find_transaction(&self, id: &str) -> Option<Transaction> {
        self.ledger.find_transaction(id)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.pending()
    }

    pub fn validate_chain(&self) -> bool {
        self.ledger.validate()
    }

    pub fn export_chain(&self) -> Vec<Block> {
        self.ledger.export()
    }

    /// Abandons any in-flight nonce search. Used on shutdown.
    pub fn cancel_mining(&self) {
        self.ledger.cancel_mining();
    }

    fn persist_profile(&self, profile: &Profile) -> Result<(), TradingError> {
        if let Some(store) = &self.store {
            store.save_profile(profile).map_err(LedgerError::from)?;
            store.flush().map_err(LedgerError::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::TxStatus;

    fn test_service() -> TradingService {
        TradingService::new(LedgerConfig::new(1, 1.0))
    }

    #[test]
    fn test_register_participant() {
        let service = test_service();

        let profile = service.register("user1", "Solar Farm A", "solar").unwrap();

        assert_eq!(profile.external_id, "user1");
        assert_eq!(profile.name, "Solar Farm A");
        assert_eq!(profile.energy_type, "solar");
        assert_eq!(profile.energy_produced, 0.0);
        assert_eq!(profile.energy_consumed, 0.0);
        assert_eq!(profile.address.0.len(), 64);

        let participants = service.participants();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].external_id, "user1");
    }

    #[test]
    fn test_same_second_registration_collides() {
        let service = test_service();
        let at = Utc::now();

        service
            .register_at("user1", "Solar Farm A", "solar", at)
            .unwrap();
        let result = service.register_at("user1", "Solar Farm A", "solar", at);

        assert!(matches!(result, Err(TradingError::AddressCollision(_))));
        assert_eq!(service.participants().len(), 1);
    }

    #[test]
    fn test_trade_between_registered_participants() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();

        let transaction = service
            .trade(&seller.address, &buyer.address, 10.0, 0.5)
            .unwrap();

        assert_eq!(transaction.total, 5.0);
        assert_eq!(transaction.status, TxStatus::Pending);
        assert_eq!(transaction.sender, buyer.address);
        assert_eq!(transaction.receiver, seller.address);
        assert_eq!(service.pending_transactions().len(), 1);

        let seller = service.profile_of("user1").unwrap();
        let buyer = service.profile_of("user2").unwrap();
        assert_eq!(seller.energy_produced, 10.0);
        assert_eq!(seller.energy_consumed, 0.0);
        assert_eq!(buyer.energy_consumed, 10.0);
    }

    #[test]
    fn test_trade_with_unknown_address_has_no_side_effect() {
        let service = test_service();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();
        let stranger = Address("unregistered".to_string());

        let result = service.trade(&stranger, &buyer.address, 1.0, 1.0);

        assert!(matches!(result, Err(TradingError::UnknownAddress(_))));
        assert!(service.pending_transactions().is_empty());
        assert_eq!(service.profile_of("user2").unwrap().energy_consumed, 0.0);
    }

    #[test]
    fn test_settle_seals_batch_and_rewards_first_participant() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();
        service
            .trade(&seller.address, &buyer.address, 10.0, 0.5)
            .unwrap();

        let outcome = service.settle().unwrap();

        match outcome {
            SettleOutcome::Sealed {
                block,
                transaction_count,
            } => {
                assert_eq!(transaction_count, 2); // trade + reward
                assert_eq!(block.index, 1);
                let reward = &block.transactions[1];
                assert!(reward.is_system_reward());
                assert_eq!(reward.receiver, seller.address);
            }
            SettleOutcome::NoPending => panic!("expected a sealed block"),
        }

        assert_eq!(service.export_chain().len(), 2);
        assert!(service.pending_transactions().is_empty());
        assert!(service.validate_chain());
    }

    #[test]
    fn test_settle_with_nothing_pending() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();
        service
            .trade(&seller.address, &buyer.address, 1.0, 1.0)
            .unwrap();

        assert!(matches!(
            service.settle().unwrap(),
            SettleOutcome::Sealed { .. }
        ));
        assert!(matches!(service.settle().unwrap(), SettleOutcome::NoPending));
        assert_eq!(service.export_chain().len(), 2);
    }

    #[test]
    fn test_settle_without_participants_falls_back_to_system_miner() {
        let service = test_service();
        service
            .ledger()
            .submit(Address::system(), Address("b".to_string()), 1.0, 0.0, None)
            .unwrap();

        match service.settle().unwrap() {
            SettleOutcome::Sealed { block, .. } => {
                assert_eq!(block.transactions.last().unwrap().receiver, Address::system());
            }
            SettleOutcome::NoPending => panic!("expected a sealed block"),
        }
    }

    #[test]
    fn test_balances_by_participant_id() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();
        service
            .trade(&seller.address, &buyer.address, 10.0, 0.5)
            .unwrap();

        // Before settling: confirmed balances are flat, projections move.
        assert_eq!(service.balance_of("user1"), Some(0.0));
        assert_eq!(service.projected_balance_of("user1"), Some(5.0));

        service.settle().unwrap();

        assert_eq!(service.balance_of("user1"), Some(5.0));
        assert_eq!(service.balance_of("user2"), Some(-5.0));
        assert_eq!(service.balance_of("nobody"), None);
    }

    #[test]
    fn test_transactions_by_participant_id() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();
        service
            .trade(&seller.address, &buyer.address, 1.0, 1.0)
            .unwrap();
        service.settle().unwrap();

        // user1 mined, so the reward shows up alongside the trade.
        let transactions = service.transactions_of("user1").unwrap();
        assert_eq!(transactions.len(), 2);

        let transactions = service.transactions_of("user2").unwrap();
        assert_eq!(transactions.len(), 1);

        assert!(service.transactions_of("nobody").is_none());
    }

    #[test]
    fn test_market_stats() {
        let service = test_service();
        let seller = service.register("user1", "Solar Farm A", "solar").unwrap();
        let buyer = service.register("user2", "Consumer B", "consumer").unwrap();

        // Nothing traded yet: average price defined as zero.
        let stats = service.market_stats();
        assert_eq!(stats.transaction_count, 0);
        assert_eq!(stats.average_price, 0.0);
        assert_eq!(stats.active_participants, 2);

        service
            .trade(&seller.address, &buyer.address, 10.0, 0.5)
            .unwrap();
        service
            .trade(&seller.address, &buyer.address, 10.0, 0.25)
            .unwrap();
        service.settle().unwrap();

        let stats = service.market_stats();
        assert_eq!(stats.total_energy_traded, 20.0);
        assert_eq!(stats.total_value_traded, 7.5);
        assert_eq!(stats.transaction_count, 2); // reward excluded
        assert_eq!(stats.average_price, 0.375);
        assert_eq!(stats.pending_count, 0);
    }
}
