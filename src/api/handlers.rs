//! Request handlers.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::engine::{Engine, SpinCommitRequest};
use crate::ledger::{InMemoryLedger, LedgerPort};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Held separately from the engine's ledger port for the funding
    /// endpoint; both point at the same ledger.
    pub ledger: Arc<InMemoryLedger>,
    pub version: String,
}

/// Health check handler
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// Commit a spin wager: reserves funds and returns the published
/// commitment.
/// POST /play/commit
pub async fn commit_spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CommitSpinRequest>,
) -> Result<Json<CommitSpinResponse>, ApiError> {
    let receipt = state
        .engine
        .commit_spin(SpinCommitRequest {
            user_id: body.user_id,
            bet_amount: body.bet_amount,
            client_seed_material: body.client_seed,
            require_free_play: body.require_free_play,
        })
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(CommitSpinResponse {
        round_id: receipt.round_id,
        server_seed_hash: receipt.server_seed_hash,
        client_seed: receipt.client_seed,
        nonce: receipt.nonce,
        is_free_play: receipt.is_free_play,
        fee_charged: receipt.fee_charged,
    }))
}

/// Open a new draw pool.
/// POST /pool/open
pub async fn open_pool_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenPoolRequest>,
) -> Result<Json<OpenPoolResponse>, ApiError> {
    let round = state
        .engine
        .open_pool(body.extra_entropy)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(OpenPoolResponse {
        round_id: round.id,
        capacity: round.pool_capacity.unwrap_or_default(),
        ticket_price: round.ticket_price.unwrap_or_default(),
        deadline: round.pool_deadline,
    }))
}

/// Buy one ticket into an open pool.
/// POST /pool/:round_id/ticket
pub async fn buy_ticket_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
    Json(body): Json<BuyTicketRequest>,
) -> Result<Json<BuyTicketResponse>, ApiError> {
    let receipt = state
        .engine
        .buy_ticket(round_id, &body.user_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(BuyTicketResponse {
        round_id: receipt.round_id,
        ticket_id: receipt.ticket_id,
        nonce: receipt.nonce,
        server_seed_hash: receipt.server_seed_hash,
        pool_status: receipt.pool_status,
        tickets_sold: receipt.tickets_sold,
        is_free_play: receipt.is_free_play,
        fee_charged: receipt.fee_charged,
    }))
}

/// Reveal a committed round, settling every stake. Idempotent.
/// POST /round/:round_id/reveal
pub async fn reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RevealResponse>, ApiError> {
    reveal_round(state, request_id, round_id).await
}

/// Reveal with the round id in the body, mirroring the commit call shape.
/// POST /play/reveal
pub async fn reveal_play_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RevealRequest>,
) -> Result<Json<RevealResponse>, ApiError> {
    reveal_round(state, request_id, body.round_id).await
}

async fn reveal_round(
    state: Arc<AppState>,
    request_id: RequestId,
    round_id: Uuid,
) -> Result<Json<RevealResponse>, ApiError> {
    let receipt = state
        .engine
        .reveal(round_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(RevealResponse {
        round_id: receipt.round_id,
        outcome: receipt.outcome,
        payout_amount: receipt.payout_amount,
        server_seed: receipt.server_seed,
        already_revealed: receipt.already_revealed,
    }))
}

/// Public round record.
/// GET /round/:round_id
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RoundResponse>, ApiError> {
    let round = state
        .engine
        .get_round(round_id)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("Round {} not found", round_id))
        })?;

    Ok(Json(RoundResponse {
        round_id: round.id,
        kind: round.kind,
        status: round.status,
        server_seed_hash: round.server_seed_hash.clone(),
        // Only disclosed after reveal; before that the record holds None.
        server_seed: round.server_seed.clone(),
        client_seed: round.client_seed.clone(),
        nonce: round.nonce,
        outcome: round.outcome.clone(),
        tickets_sold: round.tickets().len(),
        created_at: round.created_at,
        revealed_at: round.revealed_at,
    }))
}

/// Recompute a revealed round's outcome and compare with the record.
/// POST /round/:round_id/verify
pub async fn verify_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let report = state
        .engine
        .verify_round(round_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(VerifyResponse {
        round_id: report.round_id,
        valid: report.valid,
        outcome: report.outcome,
    }))
}

/// Balance lookup.
/// GET /balance/:user_id
pub async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.engine.ledger().balance(&user_id).await;
    Json(BalanceResponse {
        user_id,
        available: balance.available,
        locked: balance.locked,
        total: balance.total,
        available_display: balance.available.to_string(),
    })
}

/// Credit available funds. Deposits normally arrive from the banking side;
/// this endpoint exists for demos and integration tests.
/// POST /balance/:user_id/deposit
pub async fn deposit_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<DepositRequest>,
) -> Json<BalanceResponse> {
    state.ledger.deposit(&user_id, body.amount).await;
    let balance = state.ledger.balance(&user_id).await;
    Json(BalanceResponse {
        user_id,
        available: balance.available,
        locked: balance.locked,
        total: balance.total,
        available_display: balance.available.to_string(),
    })
}

/// Engine-wide running totals.
/// GET /stats
pub async fn stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state
        .engine
        .store()
        .load_stats()
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(StatsResponse {
        total_wagered: stats.total_wagered,
        total_paid_out: stats.total_paid_out,
        total_fees: stats.total_fees,
        rounds_settled: stats.rounds_settled,
        plays: stats.plays,
    }))
}
