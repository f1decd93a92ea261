//! API request and response models.
//!
//! Amounts travel as integer fixed-point units (1e-8 of a whole token);
//! the `*_display` fields carry the human-readable decimal rendering.

use crate::amount::Amount;
use crate::round::{OutcomeDescriptor, RoundKind, RoundStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Spin commit request
#[derive(Debug, Clone, Deserialize)]
pub struct CommitSpinRequest {
    pub user_id: String,
    /// Bet in fixed-point units.
    pub bet_amount: Amount,
    #[serde(default)]
    pub client_seed: Option<String>,
    /// Fail instead of charging the fee when no free plays remain.
    #[serde(default)]
    pub require_free_play: bool,
}

/// Spin commit response: everything the player needs to later verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSpinResponse {
    pub round_id: Uuid,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub is_free_play: bool,
    pub fee_charged: Amount,
}

/// Draw pool open request
#[derive(Debug, Clone, Deserialize)]
pub struct OpenPoolRequest {
    #[serde(default)]
    pub extra_entropy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPoolResponse {
    pub round_id: Uuid,
    pub capacity: usize,
    pub ticket_price: Amount,
    pub deadline: Option<DateTime<Utc>>,
}

/// Ticket purchase request
#[derive(Debug, Clone, Deserialize)]
pub struct BuyTicketRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyTicketResponse {
    pub round_id: Uuid,
    pub ticket_id: String,
    pub nonce: u64,
    /// Present once the pool has filled and the commitment is sealed.
    pub server_seed_hash: Option<String>,
    pub pool_status: RoundStatus,
    pub tickets_sold: usize,
    pub is_free_play: bool,
    pub fee_charged: Amount,
}

/// Body form of the reveal call; `/round/:id/reveal` is the path form.
#[derive(Debug, Clone, Deserialize)]
pub struct RevealRequest {
    pub round_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealResponse {
    pub round_id: Uuid,
    pub outcome: OutcomeDescriptor,
    pub payout_amount: Amount,
    pub server_seed: String,
    pub already_revealed: bool,
}

/// Public view of a round. The server seed appears only after reveal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponse {
    pub round_id: Uuid,
    pub kind: RoundKind,
    pub status: RoundStatus,
    pub server_seed_hash: Option<String>,
    pub server_seed: Option<String>,
    pub client_seed: Option<String>,
    pub nonce: u64,
    pub outcome: Option<OutcomeDescriptor>,
    pub tickets_sold: usize,
    pub created_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub round_id: Uuid,
    pub valid: bool,
    pub outcome: Option<OutcomeDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub available: Amount,
    pub locked: Amount,
    pub total: Amount,
    pub available_display: String,
}

/// Test/demo funding request; deposits normally arrive out of band.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_wagered: Amount,
    pub total_paid_out: Amount,
    pub total_fees: Amount,
    pub rounds_settled: u64,
    pub plays: u64,
}
