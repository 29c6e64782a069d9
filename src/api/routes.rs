use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/{tx_id}", web::get().to(handlers::get_transaction))
            .route("/participants", web::post().to(handlers::register_participant))
            .route("/participants", web::get().to(handlers::list_participants))
            .route("/participants/{participant_id}/balance", web::get().to(handlers::get_participant_balance))
            .route("/participants/{participant_id}/transactions", web::get().to(handlers::get_participant_transactions))
            .route("/trades", web::post().to(handlers::new_trade))
            .route("/mine", web::post().to(handlers::settle))
            .route("/market/stats", web::get().to(handlers::market_stats)),
    );
}
