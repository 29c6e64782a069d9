use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

mod api;
mod ledger;

use ledger::storage::LedgerStore;
use ledger::trading::{SettleOutcome, TradingError};
use ledger::{LedgerConfig, TradingService};

// Build the trading service, preferring sled-backed storage with an
// in-memory fallback
fn initialize_service() -> TradingService {
    let data_dir = "data/ledger";
    let config = LedgerConfig::default();

    match LedgerStore::open(data_dir) {
        Ok(store) => match TradingService::with_store(config.clone(), Arc::new(store)) {
            Ok(service) => {
                info!("Opened ledger storage at {}", data_dir);
                service
            }
            Err(err) => {
                warn!("Failed to load ledger from storage: {}", err);
                warn!("Falling back to in-memory ledger");
                TradingService::new(config)
            }
        },
        Err(err) => {
            warn!("Failed to open ledger storage: {}", err);
            warn!("Falling back to in-memory ledger");
            TradingService::new(config)
        }
    }
}

// Seed sample participants and trades the first time the service starts
fn seed_market(service: &TradingService) {
    if !service.participants().is_empty() {
        return;
    }

    let seeded = (|| -> Result<(), TradingError> {
        let producer = service.register("user1", "Solar Farm A", "solar")?;
        let wind = service.register("user2", "Wind Farm B", "wind")?;
        let consumer = service.register("user3", "Home Consumer C", "consumer")?;

        service.trade(&producer.address, &consumer.address, 10.5, 0.12)?;
        service.trade(&wind.address, &consumer.address, 8.3, 0.10)?;

        if let SettleOutcome::Sealed {
            block,
            transaction_count,
        } = service.settle()?
        {
            info!(
                "Seeded market: block {} sealed with {} transactions",
                block.index, transaction_count
            );
        }

        Ok(())
    })();

    if let Err(err) = seeded {
        warn!("Failed to seed market data: {}", err);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_pending_transactions,
        api::handlers::get_transaction,
        api::handlers::register_participant,
        api::handlers::list_participants,
        api::handlers::get_participant_balance,
        api::handlers::get_participant_transactions,
        api::handlers::new_trade,
        api::handlers::settle,
        api::handlers::market_stats
    ),
    components(
        schemas(
            ledger::Block,
            ledger::Transaction,
            ledger::TxStatus,
            ledger::Address,
            ledger::Profile,
            ledger::MarketStats,
            api::handlers::ChainResponse,
            api::handlers::RegisterRequest,
            api::handlers::TradeRequest,
            api::handlers::SettleResponse,
            api::handlers::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "Energy trading ledger API endpoints")
    ),
    info(
        title = "Energy Ledger API",
        version = "1.0.0",
        description = "A tamper-evident energy trading ledger API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let service = initialize_service();
    seed_market(&service);

    // Abandon any in-flight nonce search when the process is told to stop
    let shutdown_handle = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, cancelling mining");
            shutdown_handle.cancel_mining();
        }
    });

    let service = web::Data::new(service);

    info!("Starting HTTP server at http://localhost:8080");

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(service.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await?;

    Ok(())
}
