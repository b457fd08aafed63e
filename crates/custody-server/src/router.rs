use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::handler::{self, AppState};

/// Build the axum router with all ledger endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::RECORDS, post(handler::submit_record_handler))
        .route(endpoints::AUDIT, get(handler::audit_handler))
        .route(endpoints::PROOF, get(handler::proof_handler))
        .route(endpoints::CHAIN, get(handler::chain_handler))
        .route(endpoints::PUBKEY, get(handler::pubkey_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
