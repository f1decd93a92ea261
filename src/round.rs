//! Round, stake, and settlement data model with the round state machine.

use crate::amount::Amount;
use crate::errors::{EngineError, EngineResult};
use crate::selector::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wager kind: single-shot spin or multi-ticket lucky draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundKind {
    Spin,
    Draw,
}

impl fmt::Display for RoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundKind::Spin => write!(f, "spin"),
            RoundKind::Draw => write!(f, "draw"),
        }
    }
}

/// Round lifecycle state. Transitions are strictly forward; the only
/// permitted re-entries are idempotent replays of `Revealed`/`Settled`
/// returning cached results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Created,
    Open,
    Full,
    Committed,
    Revealed,
    Settled,
    Cancelled,
    /// Integrity fault detected; held for manual audit, never auto-corrected.
    Quarantined,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundStatus::Created => "created",
            RoundStatus::Open => "open",
            RoundStatus::Full => "full",
            RoundStatus::Committed => "committed",
            RoundStatus::Revealed => "revealed",
            RoundStatus::Settled => "settled",
            RoundStatus::Cancelled => "cancelled",
            RoundStatus::Quarantined => "quarantined",
        };
        write!(f, "{}", name)
    }
}

impl RoundStatus {
    /// Whether a forward transition to `next` is allowed.
    pub fn can_transition_to(self, next: RoundStatus) -> bool {
        use RoundStatus::*;
        match (self, next) {
            (Created, Open) => true,
            (Open, Full) | (Open, Committed) => true,
            (Full, Committed) => true,
            (Committed, Revealed) => true,
            (Revealed, Settled) => true,
            // Cancellation is reachable only before the commitment seals.
            (Created, Cancelled) | (Open, Cancelled) | (Full, Cancelled) => true,
            // Quarantine is reachable from any non-terminal state.
            (Created, Quarantined)
            | (Open, Quarantined)
            | (Full, Quarantined)
            | (Committed, Quarantined)
            | (Revealed, Quarantined) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RoundStatus::Settled | RoundStatus::Cancelled | RoundStatus::Quarantined
        )
    }
}

/// One ticket sold into a draw pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub user_id: String,
    /// Per-user ordinal, part of the settlement idempotency key since one
    /// user may hold many tickets in the same pool.
    pub ordinal: u32,
}

/// What the outcome is selected from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CandidateSet {
    Segments { segments: Vec<Segment> },
    Tickets { tickets: Vec<Ticket> },
}

/// One placed winner in a draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerPlace {
    /// 0-based rank: 0 is first place.
    pub rank: u32,
    pub ticket_id: String,
    pub user_id: String,
    pub prize: Amount,
}

/// The published, verifiable result of a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutcomeDescriptor {
    Segment {
        index: usize,
        multiplier: Amount,
    },
    Winners {
        winners: Vec<WinnerPlace>,
    },
}

/// A ledger reservation handle, carried by the stake intent so settlement
/// and release can always find the held funds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: String,
    pub amount: Amount,
}

/// Economic terms of a single play, retained as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeIntent {
    pub user_id: String,
    pub round_id: Uuid,
    pub bet_amount: Amount,
    pub fee_amount: Amount,
    pub is_free_play: bool,
    /// Draw-only: the ticket this stake bought.
    pub ticket_id: Option<String>,
    pub idempotency_key: String,
    pub reservation: Reservation,
}

/// Immutable ledger-facing settlement result. Written exactly once;
/// replays with the same idempotency key return the original.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementRecord {
    pub round_id: Uuid,
    pub user_id: String,
    pub outcome: OutcomeDescriptor,
    pub payout_amount: Amount,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// One wager or one draw pool cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    pub kind: RoundKind,
    pub status: RoundStatus,
    /// Secret until reveal; never written to logs before then.
    pub server_seed: Option<String>,
    /// SHA-256 hex of the server seed, published at commit time.
    pub server_seed_hash: Option<String>,
    pub client_seed: Option<String>,
    pub nonce: u64,
    pub candidate_set: CandidateSet,
    pub stake_intents: Vec<StakeIntent>,
    pub outcome: Option<OutcomeDescriptor>,
    /// Pool-only: ticket capacity and fill deadline.
    pub pool_capacity: Option<usize>,
    pub pool_deadline: Option<DateTime<Utc>>,
    /// Pool-only: operator-supplied extra entropy mixed into the client seed.
    pub extra_entropy: Option<String>,
    pub ticket_price: Option<Amount>,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub revealed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Apply a forward transition, rejecting anything the state machine
    /// does not allow.
    pub fn transition(&mut self, next: RoundStatus) -> EngineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                round_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn tickets(&self) -> &[Ticket] {
        match &self.candidate_set {
            CandidateSet::Tickets { tickets } => tickets,
            CandidateSet::Segments { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_round(status: RoundStatus) -> Round {
        Round {
            id: Uuid::new_v4(),
            kind: RoundKind::Spin,
            status,
            server_seed: None,
            server_seed_hash: None,
            client_seed: None,
            nonce: 0,
            candidate_set: CandidateSet::Segments { segments: vec![] },
            stake_intents: vec![],
            outcome: None,
            pool_capacity: None,
            pool_deadline: None,
            extra_entropy: None,
            ticket_price: None,
            created_at: Utc::now(),
            committed_at: None,
            revealed_at: None,
            settled_at: None,
        }
    }

    #[test]
    fn test_forward_transitions() {
        let mut round = blank_round(RoundStatus::Created);
        for next in [
            RoundStatus::Open,
            RoundStatus::Full,
            RoundStatus::Committed,
            RoundStatus::Revealed,
            RoundStatus::Settled,
        ] {
            round.transition(next).unwrap();
            assert_eq!(round.status, next);
        }
        assert!(round.status.is_terminal());
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut round = blank_round(RoundStatus::Revealed);
        assert!(round.transition(RoundStatus::Committed).is_err());
        assert!(round.transition(RoundStatus::Open).is_err());
    }

    #[test]
    fn test_cancel_only_before_commit() {
        for status in [RoundStatus::Created, RoundStatus::Open, RoundStatus::Full] {
            let mut round = blank_round(status);
            round.transition(RoundStatus::Cancelled).unwrap();
        }
        for status in [
            RoundStatus::Committed,
            RoundStatus::Revealed,
            RoundStatus::Settled,
        ] {
            let mut round = blank_round(status);
            assert!(round.transition(RoundStatus::Cancelled).is_err());
        }
    }

    #[test]
    fn test_quarantine_reachable_until_terminal() {
        let mut round = blank_round(RoundStatus::Committed);
        round.transition(RoundStatus::Quarantined).unwrap();

        let mut settled = blank_round(RoundStatus::Settled);
        assert!(settled.transition(RoundStatus::Quarantined).is_err());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&RoundStatus::Committed).unwrap();
        assert_eq!(json, "\"committed\"");
        let kind = serde_json::to_string(&RoundKind::Draw).unwrap();
        assert_eq!(kind, "\"draw\"");
    }
}
