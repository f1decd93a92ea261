//! Persistent round and settlement records stored in RocksDB.
//!
//! Values are JSON-encoded. Settlement records are keyed by their
//! idempotency key: the first write wins and every later write with the
//! same key is a no-op returning the original record.

use crate::amount::Amount;
use crate::errors::{EngineError, EngineResult};
use crate::round::{Round, SettlementRecord};
use rocksdb::{Direction, IteratorMode, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

const ROUND_PREFIX: &str = "round:id:";
const ACTIVE_ROUND_PREFIX: &str = "round:active:";
const SETTLEMENT_IDEM_PREFIX: &str = "settlement:idem:";
const SETTLEMENT_ROUND_PREFIX: &str = "settlement:round:";
const USER_NONCE_PREFIX: &str = "nonce:user:";
const POOL_NONCE_KEY: &[u8] = b"nonce:pool";
const ENGINE_STATS_KEY: &[u8] = b"engine:stats";

/// Running totals across all settled rounds, kept in fixed-point.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub total_wagered: Amount,
    pub total_paid_out: Amount,
    pub total_fees: Amount,
    pub rounds_settled: u64,
    pub plays: u64,
}

fn round_key(id: Uuid) -> Vec<u8> {
    format!("{}{}", ROUND_PREFIX, id).into_bytes()
}

fn active_round_key(id: Uuid) -> Vec<u8> {
    format!("{}{}", ACTIVE_ROUND_PREFIX, id).into_bytes()
}

fn settlement_idem_key(idempotency_key: &str) -> Vec<u8> {
    format!("{}{}", SETTLEMENT_IDEM_PREFIX, idempotency_key).into_bytes()
}

fn settlement_round_key(round_id: Uuid, idempotency_key: &str) -> Vec<u8> {
    format!("{}{}:{}", SETTLEMENT_ROUND_PREFIX, round_id, idempotency_key).into_bytes()
}

fn user_nonce_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", USER_NONCE_PREFIX, user_id).into_bytes()
}

fn parse_u64_le(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(arr))
}

/// RocksDB-backed store for rounds, settlement records, nonce counters and
/// engine statistics.
pub struct RoundStore {
    db: DB,
}

impl RoundStore {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let db = DB::open_default(path)?;
        Ok(Self { db })
    }

    /// Persist a round, maintaining the active-round index used by sweeps.
    pub fn put_round(&self, round: &Round) -> EngineResult<()> {
        let bytes = serde_json::to_vec(round)?;
        self.db.put(round_key(round.id), bytes)?;

        if round.status.is_terminal() {
            self.db.delete(active_round_key(round.id))?;
        } else {
            self.db.put(active_round_key(round.id), [])?;
        }
        Ok(())
    }

    pub fn get_round(&self, id: Uuid) -> EngineResult<Option<Round>> {
        let Some(bytes) = self.db.get(round_key(id))? else {
            return Ok(None);
        };
        let round: Round = serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Storage(format!("Failed to decode round {}: {}", id, e))
        })?;
        Ok(Some(round))
    }

    /// Ids of all non-terminal rounds (deadline and grace-period sweeps).
    pub fn active_round_ids(&self) -> EngineResult<Vec<Uuid>> {
        let prefix = ACTIVE_ROUND_PREFIX.as_bytes();
        let mut ids = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let raw = &key[prefix.len()..];
            let text = std::str::from_utf8(raw)
                .map_err(|e| EngineError::Storage(format!("Corrupt active index key: {}", e)))?;
            let id = Uuid::parse_str(text)
                .map_err(|e| EngineError::Storage(format!("Corrupt active index key: {}", e)))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Write a settlement record unless one already exists for the key; the
    /// stored original is always what gets returned.
    pub fn insert_settlement(&self, record: &SettlementRecord) -> EngineResult<SettlementRecord> {
        let key = settlement_idem_key(&record.idempotency_key);
        if let Some(bytes) = self.db.get(&key)? {
            let existing: SettlementRecord = serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::Storage(format!(
                    "Failed to decode settlement {}: {}",
                    record.idempotency_key, e
                ))
            })?;
            return Ok(existing);
        }

        let bytes = serde_json::to_vec(record)?;
        self.db.put(&key, bytes)?;
        self.db.put(
            settlement_round_key(record.round_id, &record.idempotency_key),
            record.idempotency_key.as_bytes(),
        )?;
        Ok(record.clone())
    }

    pub fn get_settlement(&self, idempotency_key: &str) -> EngineResult<Option<SettlementRecord>> {
        let Some(bytes) = self.db.get(settlement_idem_key(idempotency_key))? else {
            return Ok(None);
        };
        let record: SettlementRecord = serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Storage(format!(
                "Failed to decode settlement {}: {}",
                idempotency_key, e
            ))
        })?;
        Ok(Some(record))
    }

    /// All settlement records written for a round.
    pub fn settlements_for_round(&self, round_id: Uuid) -> EngineResult<Vec<SettlementRecord>> {
        let prefix = format!("{}{}:", SETTLEMENT_ROUND_PREFIX, round_id).into_bytes();
        let mut records = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let idem = std::str::from_utf8(&value)
                .map_err(|e| EngineError::Storage(format!("Corrupt settlement index: {}", e)))?;
            if let Some(record) = self.get_settlement(idem)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Next monotonic nonce for a user. Read-modify-write: the caller must
    /// hold the per-user lock.
    pub fn next_user_nonce(&self, user_id: &str) -> EngineResult<u64> {
        let key = user_nonce_key(user_id);
        let current = self
            .db
            .get(&key)?
            .and_then(|b| parse_u64_le(&b))
            .unwrap_or(0);
        let next = current + 1;
        self.db.put(&key, next.to_le_bytes())?;
        Ok(next)
    }

    /// Next monotonic nonce for draw pools. The caller must hold the pool
    /// creation lock.
    pub fn next_pool_nonce(&self) -> EngineResult<u64> {
        let current = self
            .db
            .get(POOL_NONCE_KEY)?
            .and_then(|b| parse_u64_le(&b))
            .unwrap_or(0);
        let next = current + 1;
        self.db.put(POOL_NONCE_KEY, next.to_le_bytes())?;
        Ok(next)
    }

    pub fn load_stats(&self) -> EngineResult<EngineStats> {
        match self.db.get(ENGINE_STATS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::Storage(format!("Failed to decode stats: {}", e))),
            None => Ok(EngineStats::default()),
        }
    }

    pub fn store_stats(&self, stats: &EngineStats) -> EngineResult<()> {
        let bytes = serde_json::to_vec(stats)?;
        self.db.put(ENGINE_STATS_KEY, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::{CandidateSet, OutcomeDescriptor, RoundKind, RoundStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_store() -> (RoundStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RoundStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn sample_round(status: RoundStatus) -> Round {
        Round {
            id: Uuid::new_v4(),
            kind: RoundKind::Spin,
            status,
            server_seed: None,
            server_seed_hash: Some("abc".to_string()),
            client_seed: Some("client".to_string()),
            nonce: 1,
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
    fn test_round_round_trip() {
        let (store, _dir) = test_store();
        let round = sample_round(RoundStatus::Committed);
        store.put_round(&round).unwrap();

        let loaded = store.get_round(round.id).unwrap().unwrap();
        assert_eq!(loaded.id, round.id);
        assert_eq!(loaded.status, RoundStatus::Committed);
        assert!(store.get_round(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_active_index_tracks_terminal_status() {
        let (store, _dir) = test_store();
        let mut round = sample_round(RoundStatus::Committed);
        store.put_round(&round).unwrap();
        assert_eq!(store.active_round_ids().unwrap(), vec![round.id]);

        round.status = RoundStatus::Settled;
        store.put_round(&round).unwrap();
        assert!(store.active_round_ids().unwrap().is_empty());
    }

    #[test]
    fn test_settlement_unique_by_idempotency_key() {
        let (store, _dir) = test_store();
        let round_id = Uuid::new_v4();
        let record = SettlementRecord {
            round_id,
            user_id: "alice".to_string(),
            outcome: OutcomeDescriptor::Segment {
                index: 1,
                multiplier: Amount::from_whole(2),
            },
            payout_amount: Amount::from_whole(200),
            idempotency_key: format!("{}:alice", round_id),
            created_at: Utc::now(),
        };

        let stored = store.insert_settlement(&record).unwrap();
        assert_eq!(stored, record);

        // A second write with the same key is ignored; the original wins.
        let mut replay = record.clone();
        replay.payout_amount = Amount::from_whole(999);
        let result = store.insert_settlement(&replay).unwrap();
        assert_eq!(result.payout_amount, Amount::from_whole(200));

        let listed = store.settlements_for_round(round_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].payout_amount, Amount::from_whole(200));
    }

    #[test]
    fn test_nonces_are_monotonic() {
        let (store, _dir) = test_store();
        assert_eq!(store.next_user_nonce("alice").unwrap(), 1);
        assert_eq!(store.next_user_nonce("alice").unwrap(), 2);
        assert_eq!(store.next_user_nonce("bob").unwrap(), 1);
        assert_eq!(store.next_pool_nonce().unwrap(), 1);
        assert_eq!(store.next_pool_nonce().unwrap(), 2);
    }

    #[test]
    fn test_stats_round_trip() {
        let (store, _dir) = test_store();
        assert_eq!(store.load_stats().unwrap(), EngineStats::default());

        let stats = EngineStats {
            total_wagered: Amount::from_whole(500),
            total_paid_out: Amount::from_whole(450),
            total_fees: Amount::from_whole(25),
            rounds_settled: 5,
            plays: 7,
        };
        store.store_stats(&stats).unwrap();
        assert_eq!(store.load_stats().unwrap(), stats);
    }
}
