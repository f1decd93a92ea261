//! Round lifecycle orchestration.
//!
//! Drives a wager or draw pool from creation through settlement or
//! cancellation, enforcing the ordering reserve -> commit -> reveal ->
//! settle. Per-user work (limit check + reservation) happens inside one
//! per-user lock; per-round work inside one per-round lock. Lock order is
//! always round before user, so the two never deadlock.

use crate::amount::Amount;
use crate::commitment::{seed_hash_hex, verify_outcome, SeedVault, VerifyCandidates};
use crate::config::ConfigPort;
use crate::errors::{EngineError, EngineResult};
use crate::ledger::LedgerPort;
use crate::limiter::PlayLimiter;
use crate::round::{
    CandidateSet, OutcomeDescriptor, Round, RoundKind, RoundStatus, StakeIntent, Ticket,
    WinnerPlace,
};
use crate::selector;
use crate::store::RoundStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const MAX_CLIENT_SEED_LEN: usize = 256;
/// Vault registry identity for pool commitments. Pools use the global pool
/// nonce sequence; user commitments are prefixed by `spin_vault_user` so the
/// two namespaces cannot collide, whatever a player names themselves.
const POOL_COMMIT_USER: &str = "pool";

fn spin_vault_user(user_id: &str) -> String {
    format!("user:{}", user_id)
}

/// Commit request for a single-shot spin.
#[derive(Debug, Clone)]
pub struct SpinCommitRequest {
    pub user_id: String,
    pub bet_amount: Amount,
    /// Player-supplied entropy; a random token is generated when absent.
    pub client_seed_material: Option<String>,
    /// When set, the play must be free: with no free plays remaining the
    /// request fails with `DailyLimitExceeded` instead of charging the fee.
    pub require_free_play: bool,
}

/// Published commitment for a spin.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub round_id: Uuid,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub is_free_play: bool,
    pub fee_charged: Amount,
}

/// Result of buying one draw-pool ticket.
#[derive(Debug, Clone)]
pub struct TicketReceipt {
    pub round_id: Uuid,
    pub ticket_id: String,
    pub nonce: u64,
    /// Set once the pool fills and the commitment seals.
    pub server_seed_hash: Option<String>,
    pub pool_status: RoundStatus,
    pub tickets_sold: usize,
    pub is_free_play: bool,
    pub fee_charged: Amount,
}

/// Result of a reveal; replays return the cached outcome.
#[derive(Debug, Clone)]
pub struct RevealReceipt {
    pub round_id: Uuid,
    pub outcome: OutcomeDescriptor,
    /// Total credited across the round's stakes.
    pub payout_amount: Amount,
    pub server_seed: String,
    pub verifiable: bool,
    pub already_revealed: bool,
}

/// Independent recomputation of a revealed round.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub round_id: Uuid,
    pub valid: bool,
    pub outcome: Option<OutcomeDescriptor>,
}

/// Summary of one maintenance sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub cancelled_pools: Vec<Uuid>,
    pub stuck_committed: Vec<Uuid>,
    pub released_reservations: usize,
}

/// The provably-fair outcome and stake-settlement engine.
pub struct Engine {
    config: Arc<dyn ConfigPort>,
    ledger: Arc<dyn LedgerPort>,
    store: Arc<RoundStore>,
    vault: SeedVault,
    limiter: PlayLimiter,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    round_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pool_create_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        config: Arc<dyn ConfigPort>,
        ledger: Arc<dyn LedgerPort>,
        store: Arc<RoundStore>,
    ) -> Self {
        Self {
            config,
            ledger,
            store,
            vault: SeedVault::new(),
            limiter: PlayLimiter::new(),
            user_locks: DashMap::new(),
            round_locks: DashMap::new(),
            pool_create_lock: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerPort> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<RoundStore> {
        &self.store
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn round_lock(&self, round_id: Uuid) -> Arc<Mutex<()>> {
        self.round_locks
            .entry(round_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn validate_seed_material(material: &Option<String>) -> EngineResult<()> {
        if let Some(material) = material {
            if material.is_empty() {
                return Err(EngineError::MalformedSeedMaterial(
                    "client seed material cannot be empty".to_string(),
                ));
            }
            if material.len() > MAX_CLIENT_SEED_LEN {
                return Err(EngineError::MalformedSeedMaterial(format!(
                    "client seed material exceeds {} bytes",
                    MAX_CLIENT_SEED_LEN
                )));
            }
            // ':' is the field separator in the HMAC message layout.
            if material.contains(':') {
                return Err(EngineError::MalformedSeedMaterial(
                    "client seed material must not contain ':'".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Place a spin wager: validate, reserve funds, then seal the
    /// commitment. Funds are reserved strictly before the commitment so the
    /// operator can never decline an unfavorable outcome after the fact.
    pub async fn commit_spin(&self, request: SpinCommitRequest) -> EngineResult<CommitReceipt> {
        let config = self.config.snapshot();
        self.limiter.check_bet(&config, request.bet_amount)?;
        Self::validate_seed_material(&request.client_seed_material)?;

        let client_seed = request
            .client_seed_material
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let user_lock = self.user_lock(&request.user_id);
        let _guard = user_lock.lock().await;

        let now = Utc::now();
        let is_free_play =
            self.limiter
                .check_and_reserve_free_play(&config, &request.user_id, now);
        if request.require_free_play && !is_free_play {
            return Err(EngineError::DailyLimitExceeded(request.user_id));
        }
        let fee = if is_free_play {
            Amount::ZERO
        } else {
            config.fee_per_play
        };

        let total = request
            .bet_amount
            .checked_add(fee)
            .ok_or_else(|| EngineError::Storage("stake amount overflow".to_string()))?;

        let reservation = match self.ledger.reserve(&request.user_id, total).await {
            Ok(reservation) => reservation,
            Err(e) => {
                // Resource rejection must leave no state behind.
                if is_free_play {
                    self.limiter.restore_free_play(&request.user_id);
                }
                return Err(e);
            }
        };

        let round_id = Uuid::new_v4();
        let nonce = match self.store.next_user_nonce(&request.user_id) {
            Ok(nonce) => nonce,
            Err(e) => {
                self.ledger.release(&reservation).await?;
                if is_free_play {
                    self.limiter.restore_free_play(&request.user_id);
                }
                return Err(e);
            }
        };

        let commitment = match self.vault.commit(
            round_id,
            &spin_vault_user(&request.user_id),
            nonce,
            client_seed.clone(),
        ) {
                Ok(commitment) => commitment,
                Err(e) => {
                    self.ledger.release(&reservation).await?;
                    if is_free_play {
                        self.limiter.restore_free_play(&request.user_id);
                    }
                    return Err(e);
                }
            };

        let intent = StakeIntent {
            user_id: request.user_id.clone(),
            round_id,
            bet_amount: request.bet_amount,
            fee_amount: fee,
            is_free_play,
            ticket_id: None,
            idempotency_key: format!("{}:{}", round_id, request.user_id),
            reservation,
        };

        let mut round = Round {
            id: round_id,
            kind: RoundKind::Spin,
            status: RoundStatus::Created,
            server_seed: None,
            server_seed_hash: Some(commitment.server_seed_hash.clone()),
            client_seed: Some(client_seed.clone()),
            nonce,
            candidate_set: CandidateSet::Segments {
                segments: config.segments.clone(),
            },
            stake_intents: vec![intent],
            outcome: None,
            pool_capacity: None,
            pool_deadline: None,
            extra_entropy: None,
            ticket_price: None,
            created_at: now,
            committed_at: Some(now),
            revealed_at: None,
            settled_at: None,
        };
        // Single-shot spins pass through open straight to committed.
        round.transition(RoundStatus::Open)?;
        round.transition(RoundStatus::Committed)?;
        self.store.put_round(&round)?;

        self.limiter.record_play(&config, &request.user_id, now);
        tracing::info!(
            round_id = %round_id,
            user_id = %request.user_id,
            nonce,
            is_free_play,
            "Spin committed"
        );

        Ok(CommitReceipt {
            round_id,
            server_seed_hash: commitment.server_seed_hash,
            client_seed,
            nonce,
            is_free_play,
            fee_charged: fee,
        })
    }

    /// Open a draw pool that accepts tickets until capacity or deadline.
    /// `extra_entropy` is mixed into the client seed alongside the sold
    /// ticket ids, hardening the seed against guessable ticket ids.
    pub async fn open_pool(&self, extra_entropy: Option<String>) -> EngineResult<Round> {
        Self::validate_seed_material(&extra_entropy)?;
        let config = self.config.snapshot();

        let _guard = self.pool_create_lock.lock().await;
        let nonce = self.store.next_pool_nonce()?;
        let now = Utc::now();

        let mut round = Round {
            id: Uuid::new_v4(),
            kind: RoundKind::Draw,
            status: RoundStatus::Created,
            server_seed: None,
            server_seed_hash: None,
            client_seed: None,
            nonce,
            candidate_set: CandidateSet::Tickets { tickets: vec![] },
            stake_intents: vec![],
            outcome: None,
            pool_capacity: Some(config.pool_capacity),
            pool_deadline: Some(now + Duration::seconds(config.pool_fill_timeout_secs as i64)),
            extra_entropy,
            ticket_price: Some(config.ticket_price),
            created_at: now,
            committed_at: None,
            revealed_at: None,
            settled_at: None,
        };
        round.transition(RoundStatus::Open)?;
        self.store.put_round(&round)?;

        tracing::info!(round_id = %round.id, nonce, capacity = config.pool_capacity, "Draw pool opened");
        Ok(round)
    }

    /// Buy one ticket into an open pool. Reaching capacity flips the pool
    /// to full and immediately seals the commitment over the sold tickets.
    pub async fn buy_ticket(&self, round_id: Uuid, user_id: &str) -> EngineResult<TicketReceipt> {
        let config = self.config.snapshot();

        let round_lock = self.round_lock(round_id);
        let _round_guard = round_lock.lock().await;

        let mut round = self
            .store
            .get_round(round_id)?
            .ok_or(EngineError::RoundNotFound(round_id))?;
        if round.kind != RoundKind::Draw {
            return Err(EngineError::PoolClosed(round_id));
        }
        match round.status {
            RoundStatus::Open => {}
            RoundStatus::Full => return Err(EngineError::PoolFull(round_id)),
            _ => return Err(EngineError::PoolClosed(round_id)),
        }

        let capacity = round.pool_capacity.unwrap_or(config.pool_capacity);
        if round.tickets().len() >= capacity {
            return Err(EngineError::PoolFull(round_id));
        }

        let ticket_price = round.ticket_price.unwrap_or(config.ticket_price);

        let user_lock = self.user_lock(user_id);
        let _user_guard = user_lock.lock().await;

        let now = Utc::now();
        let is_free_play = self
            .limiter
            .check_and_reserve_free_play(&config, user_id, now);
        let fee = if is_free_play {
            Amount::ZERO
        } else {
            config.fee_per_play
        };
        let total = ticket_price
            .checked_add(fee)
            .ok_or_else(|| EngineError::Storage("stake amount overflow".to_string()))?;

        let reservation = match self.ledger.reserve(user_id, total).await {
            Ok(reservation) => reservation,
            Err(e) => {
                if is_free_play {
                    self.limiter.restore_free_play(user_id);
                }
                return Err(e);
            }
        };

        let ordinal = round
            .stake_intents
            .iter()
            .filter(|i| i.user_id == user_id)
            .count() as u32;
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            ordinal,
        };
        let intent = StakeIntent {
            user_id: user_id.to_string(),
            round_id,
            bet_amount: ticket_price,
            fee_amount: fee,
            is_free_play,
            ticket_id: Some(ticket.id.clone()),
            idempotency_key: format!("{}:{}:{}", round_id, user_id, ordinal),
            reservation: reservation.clone(),
        };

        let ticket_id = ticket.id.clone();
        match &mut round.candidate_set {
            CandidateSet::Tickets { tickets } => tickets.push(ticket),
            CandidateSet::Segments { .. } => {
                return Err(EngineError::Storage(format!(
                    "draw round {} has a segment candidate set",
                    round_id
                )))
            }
        }
        round.stake_intents.push(intent);

        let tickets_sold = round.tickets().len();
        if tickets_sold == capacity {
            let sealed = round
                .transition(RoundStatus::Full)
                .and_then(|_| self.commit_pool(&mut round));
            if let Err(e) = sealed {
                // The round is not persisted on failure, so this sale never
                // happened; the buyer's funds come straight back and the
                // pool stays open for the next attempt.
                self.ledger.release(&reservation).await?;
                if is_free_play {
                    self.limiter.restore_free_play(user_id);
                }
                return Err(e);
            }
        }

        self.store.put_round(&round)?;
        self.limiter.record_play(&config, user_id, now);
        tracing::info!(
            round_id = %round_id,
            user_id = %user_id,
            tickets_sold,
            status = %round.status,
            "Ticket sold"
        );

        Ok(TicketReceipt {
            round_id,
            ticket_id,
            nonce: round.nonce,
            server_seed_hash: round.server_seed_hash.clone(),
            pool_status: round.status,
            tickets_sold,
            is_free_play,
            fee_charged: fee,
        })
    }

    /// Seal the commitment for a full pool. The client seed is derived from
    /// data fixed at this instant: the sorted ticket ids, plus any extra
    /// entropy supplied when the pool opened.
    fn commit_pool(&self, round: &mut Round) -> EngineResult<()> {
        let mut ticket_ids: Vec<String> =
            round.tickets().iter().map(|t| t.id.clone()).collect();
        ticket_ids.sort();
        let mut client_seed = ticket_ids.join(",");
        if let Some(extra) = &round.extra_entropy {
            client_seed.push('|');
            client_seed.push_str(extra);
        }

        let commitment =
            self.vault
                .commit(round.id, POOL_COMMIT_USER, round.nonce, client_seed.clone())?;
        round.server_seed_hash = Some(commitment.server_seed_hash);
        round.client_seed = Some(client_seed);
        round.committed_at = Some(Utc::now());
        round.transition(RoundStatus::Committed)?;
        Ok(())
    }

    /// Reveal the server seed, resolve the outcome, and settle every stake.
    /// Idempotent: revealing a settled round returns the cached result.
    pub async fn reveal(&self, round_id: Uuid) -> EngineResult<RevealReceipt> {
        let round_lock = self.round_lock(round_id);
        let _guard = round_lock.lock().await;

        let mut round = self
            .store
            .get_round(round_id)?
            .ok_or(EngineError::RoundNotFound(round_id))?;

        match round.status {
            RoundStatus::Committed => {}
            RoundStatus::Revealed => {
                // Crash between reveal and settle: finish settlement, all
                // of which is idempotent.
                let payout = self.settle_round(&mut round).await?;
                return Ok(self.reveal_receipt(&round, payout, true)?);
            }
            RoundStatus::Settled => {
                let payout = self
                    .store
                    .settlements_for_round(round_id)?
                    .iter()
                    .fold(Amount::ZERO, |acc, r| acc.saturating_add(r.payout_amount));
                return Ok(self.reveal_receipt(&round, payout, true)?);
            }
            RoundStatus::Created | RoundStatus::Open | RoundStatus::Full => {
                return Err(EngineError::NotCommitted(round_id));
            }
            RoundStatus::Cancelled | RoundStatus::Quarantined => {
                return Err(EngineError::InvalidTransition {
                    round_id,
                    from: round.status.to_string(),
                    to: RoundStatus::Revealed.to_string(),
                });
            }
        }

        let server_seed = match self.vault.reveal(round_id) {
            Ok(seed) => seed,
            Err(e) => {
                // Commitment exists in the store but the seed is gone
                // (restart mid-round). Funds are recovered by the
                // reconciliation sweep; the round is held for audit.
                self.quarantine(&mut round, "server seed unavailable at reveal")?;
                return Err(e);
            }
        };

        let published_hash = round.server_seed_hash.clone().unwrap_or_default();
        if seed_hash_hex(&server_seed) != published_hash {
            self.quarantine(&mut round, "revealed seed does not match commitment")?;
            return Err(EngineError::CommitmentMismatch(round_id));
        }

        let client_seed = round.client_seed.clone().unwrap_or_default();
        let outcome = self.resolve_outcome(&round, &server_seed, &client_seed)?;

        round.server_seed = Some(server_seed);
        round.outcome = Some(outcome);
        round.revealed_at = Some(Utc::now());
        round.transition(RoundStatus::Revealed)?;
        self.store.put_round(&round)?;

        let payout = self.settle_round(&mut round).await?;
        self.reveal_receipt(&round, payout, false)
    }

    /// Compute the outcome descriptor for a committed round. Pure apart
    /// from reading the round record.
    fn resolve_outcome(
        &self,
        round: &Round,
        server_seed: &str,
        client_seed: &str,
    ) -> EngineResult<OutcomeDescriptor> {
        let config = self.config.snapshot();
        match &round.candidate_set {
            CandidateSet::Segments { segments } => {
                let draw = selector::uniform_draw(server_seed, client_seed, round.nonce, 0);
                let index = selector::select_segment(segments, draw)?;
                Ok(OutcomeDescriptor::Segment {
                    index,
                    multiplier: segments[index].multiplier,
                })
            }
            CandidateSet::Tickets { tickets } => {
                let mut ticket_ids: Vec<String> = tickets.iter().map(|t| t.id.clone()).collect();
                ticket_ids.sort();

                let winner_count = config.draw_winner_count.min(ticket_ids.len());
                let winner_ids = selector::draw_winners(
                    &ticket_ids,
                    winner_count,
                    server_seed,
                    client_seed,
                    round.nonce,
                )?;

                let ticket_price = round.ticket_price.unwrap_or(config.ticket_price);
                let pot = ticket_price
                    .checked_mul_count(tickets.len() as u64)
                    .ok_or_else(|| {
                        EngineError::Storage(format!("pot overflow for round {}", round.id))
                    })?;

                let winners = winner_ids
                    .iter()
                    .enumerate()
                    .map(|(rank, ticket_id)| {
                        let user_id = tickets
                            .iter()
                            .find(|t| &t.id == ticket_id)
                            .map(|t| t.user_id.clone())
                            .unwrap_or_default();
                        let share = config.prize_splits_bps.get(rank).copied().unwrap_or(0);
                        WinnerPlace {
                            rank: rank as u32,
                            ticket_id: ticket_id.clone(),
                            user_id,
                            prize: pot.mul_bps(share),
                        }
                    })
                    .collect();
                Ok(OutcomeDescriptor::Winners { winners })
            }
        }
    }

    /// Settle every stake intent of a revealed round. Each step is
    /// idempotent, so a replay after a crash finishes the remainder without
    /// double-crediting.
    async fn settle_round(&self, round: &mut Round) -> EngineResult<Amount> {
        let outcome = round
            .outcome
            .clone()
            .ok_or_else(|| EngineError::Storage(format!("round {} revealed without outcome", round.id)))?;

        let mut total_payout = Amount::ZERO;
        let mut total_wagered = Amount::ZERO;
        let mut total_fees = Amount::ZERO;

        let intents = round.stake_intents.clone();
        for intent in &intents {
            let payout = Self::payout_for_intent(intent, &outcome);
            total_wagered = total_wagered.saturating_add(intent.bet_amount);
            total_fees = total_fees.saturating_add(intent.fee_amount);

            // Skip the ledger if the record already exists; otherwise the
            // ledger's own idempotency covers a crash after credit.
            if self.store.get_settlement(&intent.idempotency_key)?.is_none() {
                self.ledger
                    .settle(&intent.reservation, payout, &intent.idempotency_key)
                    .await?;
                let record = crate::round::SettlementRecord {
                    round_id: round.id,
                    user_id: intent.user_id.clone(),
                    outcome: outcome.clone(),
                    payout_amount: payout,
                    idempotency_key: intent.idempotency_key.clone(),
                    created_at: Utc::now(),
                };
                self.store.insert_settlement(&record)?;
            }
            total_payout = total_payout.saturating_add(payout);
        }

        if round.status == RoundStatus::Revealed {
            round.settled_at = Some(Utc::now());
            round.transition(RoundStatus::Settled)?;
            self.store.put_round(round)?;

            let mut stats = self.store.load_stats()?;
            stats.total_wagered = stats.total_wagered.saturating_add(total_wagered);
            stats.total_paid_out = stats.total_paid_out.saturating_add(total_payout);
            stats.total_fees = stats.total_fees.saturating_add(total_fees);
            stats.rounds_settled += 1;
            stats.plays += intents.len() as u64;
            self.store.store_stats(&stats)?;

            tracing::info!(
                round_id = %round.id,
                payout = %total_payout,
                stakes = intents.len(),
                "Round settled"
            );
        }

        Ok(total_payout)
    }

    fn payout_for_intent(intent: &StakeIntent, outcome: &OutcomeDescriptor) -> Amount {
        match outcome {
            OutcomeDescriptor::Segment { multiplier, .. } => {
                intent.bet_amount.mul_multiplier(*multiplier)
            }
            OutcomeDescriptor::Winners { winners } => winners
                .iter()
                .filter(|w| Some(&w.ticket_id) == intent.ticket_id.as_ref())
                .fold(Amount::ZERO, |acc, w| acc.saturating_add(w.prize)),
        }
    }

    fn reveal_receipt(
        &self,
        round: &Round,
        payout: Amount,
        already_revealed: bool,
    ) -> EngineResult<RevealReceipt> {
        Ok(RevealReceipt {
            round_id: round.id,
            outcome: round
                .outcome
                .clone()
                .ok_or_else(|| EngineError::Storage(format!("round {} missing outcome", round.id)))?,
            payout_amount: payout,
            server_seed: round.server_seed.clone().unwrap_or_default(),
            verifiable: true,
            already_revealed,
        })
    }

    /// Cancel a round that has not yet committed, releasing every
    /// outstanding reservation.
    pub async fn cancel(&self, round_id: Uuid) -> EngineResult<()> {
        let round_lock = self.round_lock(round_id);
        let _guard = round_lock.lock().await;

        let mut round = self
            .store
            .get_round(round_id)?
            .ok_or(EngineError::RoundNotFound(round_id))?;
        round.transition(RoundStatus::Cancelled)?;

        for intent in &round.stake_intents {
            self.ledger.release(&intent.reservation).await?;
        }
        self.store.put_round(&round)?;
        tracing::info!(round_id = %round_id, stakes = round.stake_intents.len(), "Round cancelled");
        Ok(())
    }

    fn quarantine(&self, round: &mut Round, reason: &str) -> EngineResult<()> {
        tracing::error!(round_id = %round.id, reason, "Quarantining round for manual audit");
        round.transition(RoundStatus::Quarantined)?;
        self.store.put_round(round)?;
        Ok(())
    }

    /// Recompute a revealed round's outcome from first principles.
    /// A mismatch quarantines the round; it is never silently corrected.
    pub async fn verify_round(&self, round_id: Uuid) -> EngineResult<VerifyReport> {
        let round_lock = self.round_lock(round_id);
        let _guard = round_lock.lock().await;

        let mut round = self
            .store
            .get_round(round_id)?
            .ok_or(EngineError::RoundNotFound(round_id))?;

        let (Some(server_seed), Some(hash), Some(client_seed), Some(outcome)) = (
            round.server_seed.clone(),
            round.server_seed_hash.clone(),
            round.client_seed.clone(),
            round.outcome.clone(),
        ) else {
            return Err(EngineError::NotCommitted(round_id));
        };

        let valid = match &round.candidate_set {
            CandidateSet::Segments { segments } => verify_outcome(
                &server_seed,
                &hash,
                &client_seed,
                round.nonce,
                &VerifyCandidates::Segments(segments),
                &outcome,
            )?,
            CandidateSet::Tickets { tickets } => {
                let mut ticket_ids: Vec<String> = tickets.iter().map(|t| t.id.clone()).collect();
                ticket_ids.sort();
                verify_outcome(
                    &server_seed,
                    &hash,
                    &client_seed,
                    round.nonce,
                    &VerifyCandidates::Tickets(&ticket_ids),
                    &outcome,
                )?
            }
        };

        if !valid && !round.status.is_terminal() {
            self.quarantine(&mut round, "verification mismatch")?;
        }

        Ok(VerifyReport {
            round_id,
            valid,
            outcome: Some(outcome),
        })
    }

    pub fn get_round(&self, round_id: Uuid) -> EngineResult<Option<Round>> {
        self.store.get_round(round_id)
    }

    /// Cancel open pools whose fill deadline has passed.
    pub async fn cancel_expired_pools(&self, now: DateTime<Utc>) -> EngineResult<Vec<Uuid>> {
        let mut cancelled = Vec::new();
        for round_id in self.store.active_round_ids()? {
            let Some(round) = self.store.get_round(round_id)? else {
                continue;
            };
            if round.kind != RoundKind::Draw || round.status != RoundStatus::Open {
                continue;
            }
            let Some(deadline) = round.pool_deadline else {
                continue;
            };
            if deadline < now {
                self.cancel(round_id).await?;
                cancelled.push(round_id);
            }
        }
        Ok(cancelled)
    }

    /// Rounds sitting in committed beyond the grace period. Funds are
    /// already reserved, so these are flagged for forced reveal rather than
    /// discarded.
    pub fn stuck_committed_rounds(&self, grace: Duration) -> EngineResult<Vec<Uuid>> {
        let cutoff = Utc::now() - grace;
        let mut stuck = Vec::new();
        for round_id in self.store.active_round_ids()? {
            let Some(round) = self.store.get_round(round_id)? else {
                continue;
            };
            if round.status != RoundStatus::Committed {
                continue;
            }
            if round.committed_at.map_or(false, |at| at < cutoff) {
                tracing::warn!(round_id = %round_id, "Round stuck in committed; flagging for forced reveal");
                stuck.push(round_id);
            }
        }
        Ok(stuck)
    }

    /// One maintenance pass: expire unfilled pools, flag stuck commits, and
    /// release ghost locks through the ledger's reconciliation.
    pub async fn sweep(&self) -> EngineResult<SweepReport> {
        let config = self.config.snapshot();
        let cancelled_pools = self.cancel_expired_pools(Utc::now()).await?;
        let stuck_committed =
            self.stuck_committed_rounds(Duration::seconds(config.reveal_grace_secs as i64))?;
        let released = self
            .ledger
            .reconcile(Duration::seconds(config.reservation_timeout_secs as i64))
            .await?;

        Ok(SweepReport {
            cancelled_pools,
            stuck_committed,
            released_reservations: released.len(),
        })
    }
}

/// Background worker running the maintenance sweep on an interval,
/// off the request path.
pub fn spawn_sweeper(
    engine: Arc<Engine>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            match engine.sweep().await {
                Ok(report) => {
                    if !report.cancelled_pools.is_empty()
                        || !report.stuck_committed.is_empty()
                        || report.released_reservations > 0
                    {
                        tracing::info!(
                            cancelled = report.cancelled_pools.len(),
                            stuck = report.stuck_committed.len(),
                            released = report.released_reservations,
                            "Maintenance sweep"
                        );
                    }
                }
                Err(e) => tracing::warn!("Maintenance sweep failed: {}", e),
            }
        }
    })
}
