//! Error types for the fairness and settlement engine.
//!
//! Grouped by how the caller recovers: validation and resource errors are
//! rejected synchronously with no state mutation; integrity errors quarantine
//! the round for manual audit; infrastructure errors are recovered through
//! idempotency keys and the reconciliation sweep, never by blind re-execution.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // --- Validation: rejected before any state is touched ---
    #[error("Bet {bet} outside allowed range [{min}, {max}]")]
    BetOutOfRange { bet: String, min: String, max: String },

    #[error("Malformed client seed material: {0}")]
    MalformedSeedMaterial(String),

    // --- Resource: rejected with no reservation taken ---
    #[error("Insufficient funds for user {user_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        user_id: String,
        requested: String,
        available: String,
    },

    #[error("Daily free-play limit exceeded for user {0}")]
    DailyLimitExceeded(String),

    #[error("Pool {0} is full")]
    PoolFull(Uuid),

    #[error("Pool {0} is closed to new stakes")]
    PoolClosed(Uuid),

    // --- Integrity: fatal, round quarantined, never auto-corrected ---
    #[error("Duplicate commitment for user {user_id} at nonce {nonce}")]
    DuplicateCommitment { user_id: String, nonce: u64 },

    #[error("Round {0} has no commitment to reveal")]
    NotCommitted(Uuid),

    #[error("Commitment mismatch for round {0}: revealed seed does not match published hash")]
    CommitmentMismatch(Uuid),

    #[error("Outcome mismatch for round {0}: recomputed outcome differs from the published descriptor")]
    OutcomeMismatch(Uuid),

    #[error("Invalid round transition for {round_id}: {from} -> {to}")]
    InvalidTransition {
        round_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Round {0} not found")]
    RoundNotFound(Uuid),

    #[error("Unknown reservation {0}")]
    UnknownReservation(Uuid),

    // --- Infrastructure ---
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<rocksdb::Error> for EngineError {
    fn from(e: rocksdb::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Storage(format!("JSON codec: {}", e))
    }
}
