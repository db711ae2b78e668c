use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/chain/{peer_id}", web::get().to(handlers::get_peer_chain))
        .route("/ledger", web::get().to(handlers::get_ledger))
        .route("/nodes", web::get().to(handlers::get_nodes))
        .route("/block", web::post().to(handlers::new_block))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/sync", web::post().to(handlers::sync_block));
}
