use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::trading::{SettleOutcome, TradingError};
use crate::ledger::transaction::DEFAULT_ENERGY_TYPE;
use crate::ledger::{Address, Block, MarketStats, Profile, Transaction, TradingService};

/// Shared handle to the trading service
pub type TradingData = web::Data<TradingService>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Request for the participant registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// External participant identifier
    pub external_id: String,

    /// Display name
    pub name: String,

    /// Energy source tag, defaults to solar
    pub energy_type: Option<String>,
}

/// Request for the trade endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TradeRequest {
    /// The seller's address
    pub seller: String,

    /// The buyer's address
    pub buyer: String,

    /// Amount of energy in kWh
    pub amount: f64,

    /// Price per kWh
    pub price: f64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SettleResponse {
    /// The message
    pub message: String,

    /// The newly sealed block, absent when nothing was pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,

    /// Number of transactions in the sealed block
    pub transaction_count: usize,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// External participant identifier
    pub participant_id: String,

    /// The participant's derived address
    pub address: String,

    /// Net balance over confirmed transactions
    pub balance: f64,

    /// Balance as it would read if every pending transaction confirmed
    pub projected_balance: f64,
}

/// Get the full chain
///
/// Returns the entire chain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(service: TradingData) -> impl Responder {
    let chain = service.export_chain();
    let is_valid = service.validate_chain();

    let response = ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    };

    HttpResponse::Ok().json(response)
}

/// Check if the chain is valid
///
/// Walks the whole chain re-checking hashes, linkage and proofs
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(service: TradingData) -> impl Responder {
    let is_valid = service.validate_chain();
    HttpResponse::Ok().json(is_valid)
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be sealed into a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(service: TradingData) -> impl Responder {
    let transactions = service.pending_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Get a transaction by id
///
/// Looks the transaction up across sealed blocks and the pending queue
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{tx_id}",
    responses(
        (status = 200, description = "Transaction found", body = Transaction),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn get_transaction(service: TradingData, tx_id: web::Path<String>) -> impl Responder {
    match service.find_transaction(&tx_id.into_inner()) {
        Some(transaction) => HttpResponse::Ok().json(transaction),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Transaction not found"
        })),
    }
}

/// Register a new participant
///
/// Derives an address from the external id and the registration instant
#[utoipa::path(
    post,
    path = "/api/v1/participants",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Participant registered successfully", body = Profile),
        (status = 409, description = "Address collision for this registration instant")
    )
)]
pub async fn register_participant(
    service: TradingData,
    register_req: web::Json<RegisterRequest>,
) -> impl Responder {
    let energy_type = register_req
        .energy_type
        .as_deref()
        .unwrap_or(DEFAULT_ENERGY_TYPE);

    match service.register(&register_req.external_id, &register_req.name, energy_type) {
        Ok(profile) => HttpResponse::Created().json(profile),
        Err(err @ TradingError::AddressCollision(_)) => {
            HttpResponse::Conflict().json(serde_json::json!({
                "error": format!("Failed to register participant: {}", err)
            }))
        }
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to register participant: {}", err)
        })),
    }
}

/// Get all registered participants
///
/// Returns profiles in registration order
#[utoipa::path(
    get,
    path = "/api/v1/participants",
    responses(
        (status = 200, description = "Participants retrieved successfully", body = Vec<Profile>)
    )
)]
pub async fn list_participants(service: TradingData) -> impl Responder {
    HttpResponse::Ok().json(service.participants())
}

/// Get a participant's balance
///
/// Returns both the confirmed and the pending-inclusive reading
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant_id}/balance",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 404, description = "Unknown participant")
    )
)]
pub async fn get_participant_balance(
    service: TradingData,
    participant_id: web::Path<String>,
) -> impl Responder {
    let participant_id = participant_id.into_inner();

    match service.profile_of(&participant_id) {
        Some(profile) => {
            let balance = service.balance_of(&participant_id).unwrap_or(0.0);
            let projected_balance = service.projected_balance_of(&participant_id).unwrap_or(0.0);

            let response = BalanceResponse {
                participant_id,
                address: profile.address.0,
                balance,
                projected_balance,
            };

            HttpResponse::Ok().json(response)
        }
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Unknown participant: {}", participant_id)
        })),
    }
}

/// Get a participant's transactions
///
/// Every transaction where the participant is sender or receiver
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant_id}/transactions",
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = Vec<Transaction>),
        (status = 404, description = "Unknown participant")
    )
)]
pub async fn get_participant_transactions(
    service: TradingData,
    participant_id: web::Path<String>,
) -> impl Responder {
    let participant_id = participant_id.into_inner();

    match service.transactions_of(&participant_id) {
        Some(transactions) => HttpResponse::Ok().json(transactions),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Unknown participant: {}", participant_id)
        })),
    }
}

/// Submit a new trade
///
/// Queues an energy transfer between two registered participants
#[utoipa::path(
    post,
    path = "/api/v1/trades",
    request_body = TradeRequest,
    responses(
        (status = 201, description = "Trade queued successfully", body = Transaction),
        (status = 400, description = "Invalid trade data"),
        (status = 404, description = "Unknown seller or buyer address")
    )
)]
pub async fn new_trade(
    service: TradingData,
    trade_req: web::Json<TradeRequest>,
) -> impl Responder {
    let seller = Address(trade_req.seller.clone());
    let buyer = Address(trade_req.buyer.clone());

    match service.trade(&seller, &buyer, trade_req.amount, trade_req.price) {
        Ok(transaction) => HttpResponse::Created().json(transaction),
        Err(err @ TradingError::UnknownAddress(_)) => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Failed to queue trade: {}", err)
            }))
        }
        Err(err @ TradingError::Transaction(_)) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Failed to queue trade: {}", err)
            }))
        }
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to queue trade: {}", err)
        })),
    }
}

/// Seal the pending batch into a new block
///
/// Runs the proof of work search on a blocking worker; the reward goes to
/// the first registered participant
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Mining outcome", body = SettleResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn settle(service: TradingData) -> impl Responder {
    let service = service.get_ref().clone();

    let outcome = match web::block(move || service.settle()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Mining task failed: {}", err)
            }));
        }
    };

    match outcome {
        Ok(SettleOutcome::Sealed {
            block,
            transaction_count,
        }) => HttpResponse::Ok().json(SettleResponse {
            message: "New block sealed".to_string(),
            block: Some(block),
            transaction_count,
        }),
        Ok(SettleOutcome::NoPending) => HttpResponse::Ok().json(SettleResponse {
            message: "No pending transactions to process".to_string(),
            block: None,
            transaction_count: 0,
        }),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to seal block: {}", err)
        })),
    }
}

/// Get market statistics
///
/// Aggregates over confirmed participant-to-participant trades
#[utoipa::path(
    get,
    path = "/api/v1/market/stats",
    responses(
        (status = 200, description = "Market statistics retrieved successfully", body = MarketStats)
    )
)]
pub async fn market_stats(service: TradingData) -> impl Responder {
    HttpResponse::Ok().json(service.market_stats())
}
