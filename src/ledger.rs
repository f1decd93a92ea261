//! Balance ledger port and its in-memory implementation.
//!
//! `reserve` is the only operation that may reduce `available`; `settle` is
//! idempotent by key and writes exactly one immutable ledger line; `release`
//! undoes a reservation that never reached commitment. Per-user operations
//! are serialized through a per-account mutex so two racing plays cannot
//! both pass a balance check against stale state. The invariant
//! `available + locked == total` holds across every operation.

use crate::amount::Amount;
use crate::errors::{EngineError, EngineResult};
use crate::round::Reservation;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Point-in-time view of one user's balances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountBalance {
    pub available: Amount,
    pub locked: Amount,
    pub total: Amount,
}

/// One immutable ledger line, written by a successful settle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub idempotency_key: String,
    pub user_id: String,
    pub reservation_id: Uuid,
    pub reserved: Amount,
    pub payout: Amount,
    pub created_at: DateTime<Utc>,
}

/// Narrow seam over the external balance ledger.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Atomically move `amount` from available to locked. Serialized per
    /// user; fails with `InsufficientFunds` without mutating anything.
    async fn reserve(&self, user_id: &str, amount: Amount) -> EngineResult<Reservation>;

    /// Consume a reservation and credit `payout`. Replaying with the same
    /// idempotency key returns the original entry without re-crediting.
    async fn settle(
        &self,
        reservation: &Reservation,
        payout: Amount,
        idempotency_key: &str,
    ) -> EngineResult<LedgerEntry>;

    /// Return a reservation to available. Used only on abort before
    /// commitment and by the reconciliation sweep.
    async fn release(&self, reservation: &Reservation) -> EngineResult<()>;

    async fn balance(&self, user_id: &str) -> AccountBalance;

    /// Release reservations older than `older_than` that were never settled
    /// or released (ghost locks). Returns the reservations freed.
    async fn reconcile(&self, older_than: Duration) -> EngineResult<Vec<Reservation>>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Account {
    available: Amount,
    locked: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Held,
    Settled,
    Released,
}

struct Hold {
    user_id: String,
    amount: Amount,
    created_at: DateTime<Utc>,
    state: HoldState,
}

/// In-memory ledger, used directly by the engine and as the test fake for
/// the external balance service.
pub struct InMemoryLedger {
    accounts: DashMap<String, Arc<Mutex<Account>>>,
    holds: DashMap<Uuid, Hold>,
    settlements: DashMap<String, LedgerEntry>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            holds: DashMap::new(),
            settlements: DashMap::new(),
        }
    }

    fn account(&self, user_id: &str) -> Arc<Mutex<Account>> {
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Account::default())))
            .value()
            .clone()
    }

    /// Credit available funds. Deposits arrive from outside the engine
    /// (banking is an external collaborator); exposed for seeding and tests.
    pub async fn deposit(&self, user_id: &str, amount: Amount) {
        let account = self.account(user_id);
        let mut guard = account.lock().await;
        guard.available = guard.available.saturating_add(amount);
    }

    /// Count of holds still outstanding, for observability.
    pub fn outstanding_holds(&self) -> usize {
        self.holds
            .iter()
            .filter(|h| h.state == HoldState::Held)
            .count()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn reserve(&self, user_id: &str, amount: Amount) -> EngineResult<Reservation> {
        let account = self.account(user_id);
        let mut guard = account.lock().await;

        let Some(remaining) = guard.available.checked_sub(amount) else {
            return Err(EngineError::InsufficientFunds {
                user_id: user_id.to_string(),
                requested: amount.to_string(),
                available: guard.available.to_string(),
            });
        };
        guard.available = remaining;
        guard.locked = guard.locked.saturating_add(amount);

        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount,
        };
        self.holds.insert(
            reservation.id,
            Hold {
                user_id: user_id.to_string(),
                amount,
                created_at: Utc::now(),
                state: HoldState::Held,
            },
        );
        Ok(reservation)
    }

    async fn settle(
        &self,
        reservation: &Reservation,
        payout: Amount,
        idempotency_key: &str,
    ) -> EngineResult<LedgerEntry> {
        // Fast path for replays; re-checked under the account lock below.
        if let Some(existing) = self.settlements.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let account = self.account(&reservation.user_id);
        let mut guard = account.lock().await;

        if let Some(existing) = self.settlements.get(idempotency_key) {
            return Ok(existing.clone());
        }

        {
            let mut hold = self
                .holds
                .get_mut(&reservation.id)
                .ok_or(EngineError::UnknownReservation(reservation.id))?;
            if hold.state != HoldState::Held {
                return Err(EngineError::Storage(format!(
                    "reservation {} already {:?} under a different key",
                    reservation.id, hold.state
                )));
            }
            hold.state = HoldState::Settled;
        }

        guard.locked = guard
            .locked
            .checked_sub(reservation.amount)
            .ok_or_else(|| {
                EngineError::Storage(format!(
                    "locked balance underflow settling reservation {}",
                    reservation.id
                ))
            })?;
        guard.available = guard.available.saturating_add(payout);

        let entry = LedgerEntry {
            idempotency_key: idempotency_key.to_string(),
            user_id: reservation.user_id.clone(),
            reservation_id: reservation.id,
            reserved: reservation.amount,
            payout,
            created_at: Utc::now(),
        };
        self.settlements
            .insert(idempotency_key.to_string(), entry.clone());
        Ok(entry)
    }

    async fn release(&self, reservation: &Reservation) -> EngineResult<()> {
        let account = self.account(&reservation.user_id);
        let mut guard = account.lock().await;

        let mut hold = self
            .holds
            .get_mut(&reservation.id)
            .ok_or(EngineError::UnknownReservation(reservation.id))?;
        if hold.state != HoldState::Held {
            // Releasing a settled or already-released hold is a no-op.
            return Ok(());
        }
        hold.state = HoldState::Released;

        guard.locked = guard.locked.checked_sub(hold.amount).ok_or_else(|| {
            EngineError::Storage(format!(
                "locked balance underflow releasing reservation {}",
                reservation.id
            ))
        })?;
        guard.available = guard.available.saturating_add(hold.amount);
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> AccountBalance {
        let account = self.account(user_id);
        let guard = account.lock().await;
        AccountBalance {
            available: guard.available,
            locked: guard.locked,
            total: guard.available.saturating_add(guard.locked),
        }
    }

    async fn reconcile(&self, older_than: Duration) -> EngineResult<Vec<Reservation>> {
        let cutoff = Utc::now() - older_than;
        let stale: Vec<Reservation> = self
            .holds
            .iter()
            .filter(|h| h.state == HoldState::Held && h.created_at <= cutoff)
            .map(|h| Reservation {
                id: *h.key(),
                user_id: h.user_id.clone(),
                amount: h.amount,
            })
            .collect();

        let mut released = Vec::with_capacity(stale.len());
        for reservation in stale {
            tracing::warn!(
                reservation_id = %reservation.id,
                user_id = %reservation.user_id,
                "Releasing ghost lock: reservation never settled"
            );
            self.release(&reservation).await?;
            released.push(reservation);
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn funded_ledger(user: &str, whole: u64) -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.deposit(user, Amount::from_whole(whole)).await;
        ledger
    }

    async fn assert_invariant(ledger: &InMemoryLedger, user: &str) {
        let b = ledger.balance(user).await;
        assert_eq!(b.available.saturating_add(b.locked), b.total);
    }

    #[tokio::test]
    async fn test_reserve_moves_available_to_locked() {
        let ledger = funded_ledger("alice", 100).await;
        let reservation = ledger
            .reserve("alice", Amount::from_whole(30))
            .await
            .unwrap();
        assert_eq!(reservation.amount, Amount::from_whole(30));

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.available, Amount::from_whole(70));
        assert_eq!(balance.locked, Amount::from_whole(30));
        assert_eq!(balance.total, Amount::from_whole(100));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state_untouched() {
        let ledger = funded_ledger("alice", 10).await;
        let err = ledger
            .reserve("alice", Amount::from_whole(11))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.available, Amount::from_whole(10));
        assert_eq!(balance.locked, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let ledger = funded_ledger("alice", 100).await;
        let reservation = ledger
            .reserve("alice", Amount::from_whole(50))
            .await
            .unwrap();

        let first = ledger
            .settle(&reservation, Amount::from_whole(80), "round:alice")
            .await
            .unwrap();
        // Replays return the original entry and credit nothing extra.
        for _ in 0..3 {
            let again = ledger
                .settle(&reservation, Amount::from_whole(80), "round:alice")
                .await
                .unwrap();
            assert_eq!(again, first);
        }

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.available, Amount::from_whole(130));
        assert_eq!(balance.locked, Amount::ZERO);
        assert_invariant(&ledger, "alice").await;
    }

    #[tokio::test]
    async fn test_release_returns_funds() {
        let ledger = funded_ledger("alice", 100).await;
        let reservation = ledger
            .reserve("alice", Amount::from_whole(40))
            .await
            .unwrap();
        ledger.release(&reservation).await.unwrap();

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.available, Amount::from_whole(100));
        assert_eq!(balance.locked, Amount::ZERO);

        // Double release is a no-op.
        ledger.release(&reservation).await.unwrap();
        let balance = ledger.balance("alice").await;
        assert_eq!(balance.available, Amount::from_whole(100));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_cannot_overdraw() {
        let ledger = Arc::new(funded_ledger("alice", 100).await);

        // 10 racing reserves of 30 against a balance of 100: at most 3 can
        // succeed no matter the interleaving.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve("alice", Amount::from_whole(30)).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 3);

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.locked, Amount::from_whole(90));
        assert_eq!(balance.available, Amount::from_whole(10));
        assert_invariant(&ledger, "alice").await;
    }

    #[tokio::test]
    async fn test_reconcile_releases_ghost_locks() {
        let ledger = funded_ledger("alice", 100).await;
        let ghost = ledger
            .reserve("alice", Amount::from_whole(25))
            .await
            .unwrap();
        let live = ledger
            .reserve("alice", Amount::from_whole(10))
            .await
            .unwrap();
        ledger
            .settle(&live, Amount::ZERO, "live:settled")
            .await
            .unwrap();

        // Zero max-age treats every unsettled hold as stale.
        let released = ledger.reconcile(Duration::zero()).await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, ghost.id);

        let balance = ledger.balance("alice").await;
        assert_eq!(balance.locked, Amount::ZERO);
        assert_eq!(balance.available, Amount::from_whole(90));
        assert_eq!(ledger.outstanding_holds(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_spares_recent_holds() {
        let ledger = funded_ledger("alice", 100).await;
        let _held = ledger
            .reserve("alice", Amount::from_whole(25))
            .await
            .unwrap();

        let released = ledger.reconcile(Duration::seconds(60)).await.unwrap();
        assert!(released.is_empty());
        assert_eq!(ledger.outstanding_holds(), 1);
    }
}
