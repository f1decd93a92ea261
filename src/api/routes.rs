//! Route definitions.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Spin wagers
        .route("/play/commit", post(commit_spin_handler))
        .route("/play/reveal", post(reveal_play_handler))
        // Draw pools
        .route("/pool/open", post(open_pool_handler))
        .route("/pool/:round_id/ticket", post(buy_ticket_handler))
        // Round lifecycle and verification
        .route("/round/:round_id", get(round_handler))
        .route("/round/:round_id/reveal", post(reveal_handler))
        .route("/round/:round_id/verify", post(verify_handler))
        // Balances
        .route("/balance/:user_id", get(balance_handler))
        .route("/balance/:user_id/deposit", post(deposit_handler))
        // Running totals
        .route("/stats", get(stats_handler))
        .with_state(state)
}
