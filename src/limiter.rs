//! Per-user play limits: daily free-play allowance and bet-size bounds.
//!
//! Counter mutation happens inside the engine's per-user lock, the same
//! serialization boundary as the ledger reservation, so two simultaneous
//! plays cannot both consume the last free play.

use crate::amount::Amount;
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Per-user allowance state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayLimitCounters {
    pub user_id: String,
    pub free_plays_remaining_today: u32,
    pub last_reset_at: DateTime<Utc>,
    pub total_plays_lifetime: u64,
}

pub struct PlayLimiter {
    counters: DashMap<String, PlayLimitCounters>,
}

impl PlayLimiter {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Reject bets outside `[min_bet, max_bet]`; never clamp.
    pub fn check_bet(&self, config: &EngineConfig, bet: Amount) -> EngineResult<()> {
        if bet < config.min_bet || bet > config.max_bet {
            return Err(EngineError::BetOutOfRange {
                bet: bet.to_string(),
                min: config.min_bet.to_string(),
                max: config.max_bet.to_string(),
            });
        }
        Ok(())
    }

    /// Consume one free play if any remain today. Returns whether the play
    /// is free. Must be called while holding the engine's per-user lock.
    pub fn check_and_reserve_free_play(
        &self,
        config: &EngineConfig,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entry = self.counters.entry(user_id.to_string()).or_insert_with(|| {
            PlayLimitCounters {
                user_id: user_id.to_string(),
                free_plays_remaining_today: config.free_plays_per_day,
                last_reset_at: now,
                total_plays_lifetime: 0,
            }
        });

        // Lazy daily rollover; the external scheduler only has to keep the
        // clock moving.
        if !same_utc_day(entry.last_reset_at, now) {
            entry.free_plays_remaining_today = config.free_plays_per_day;
            entry.last_reset_at = now;
        }

        if entry.free_plays_remaining_today > 0 {
            entry.free_plays_remaining_today -= 1;
            true
        } else {
            false
        }
    }

    /// Return a free play consumed by an attempt that was then rejected
    /// before taking a reservation. Must be called under the same per-user
    /// lock as the consumption.
    pub fn restore_free_play(&self, user_id: &str) {
        if let Some(mut entry) = self.counters.get_mut(user_id) {
            entry.free_plays_remaining_today += 1;
        }
    }

    /// Record a completed play against lifetime counters.
    pub fn record_play(&self, config: &EngineConfig, user_id: &str, now: DateTime<Utc>) {
        let mut entry = self.counters.entry(user_id.to_string()).or_insert_with(|| {
            PlayLimitCounters {
                user_id: user_id.to_string(),
                free_plays_remaining_today: config.free_plays_per_day,
                last_reset_at: now,
                total_plays_lifetime: 0,
            }
        });
        entry.total_plays_lifetime += 1;
    }

    pub fn counters(&self, user_id: &str) -> Option<PlayLimitCounters> {
        self.counters.get(user_id).map(|c| c.clone())
    }
}

impl Default for PlayLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.ordinal() == b.ordinal()
}
