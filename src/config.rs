//! Engine configuration.
//!
//! All game parameters are read once into an immutable snapshot that gets
//! injected into the engine, so outcomes are reproducible in tests without a
//! live config store. The loader supports a TOML file plus environment
//! variable overrides, with validation before use.

use crate::amount::{Amount, BPS_DENOM};
use crate::errors::{EngineError, EngineResult};
use crate::selector::Segment;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Immutable snapshot of every parameter the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Inclusive bet bounds; out-of-range bets are rejected, never clamped.
    pub min_bet: Amount,
    pub max_bet: Amount,
    /// Flat fee per paid play, waived on free plays.
    pub fee_per_play: Amount,
    pub free_plays_per_day: u32,
    /// Spin wheel segment table.
    pub segments: Vec<Segment>,
    /// Draw pool parameters.
    pub pool_capacity: usize,
    pub ticket_price: Amount,
    pub pool_fill_timeout_secs: u64,
    pub draw_winner_count: usize,
    /// Ordered prize shares per rank, in basis points of the pot.
    pub prize_splits_bps: Vec<u64>,
    /// A round stuck in committed beyond this is flagged for forced reveal.
    pub reveal_grace_secs: u64,
    /// Reservations older than this with no settlement are released by the
    /// reconciliation sweep.
    pub reservation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_bet: Amount::from_whole(10),
            max_bet: Amount::from_whole(1_000),
            fee_per_play: Amount::from_whole(5),
            free_plays_per_day: 1,
            segments: vec![
                Segment {
                    weight: 5,
                    multiplier: Amount::ZERO,
                },
                Segment {
                    weight: 3,
                    multiplier: Amount::from_whole(1),
                },
                Segment {
                    weight: 2,
                    multiplier: Amount::from_whole(2),
                },
            ],
            pool_capacity: 10,
            ticket_price: Amount::from_whole(10),
            pool_fill_timeout_secs: 3_600,
            draw_winner_count: 3,
            prize_splits_bps: vec![5_000, 3_000, 2_000],
            reveal_grace_secs: 300,
            reservation_timeout_secs: 900,
        }
    }
}

/// Read-only configuration seam, substitutable with a fixed snapshot in
/// tests and with a live store in deployment.
pub trait ConfigPort: Send + Sync {
    fn snapshot(&self) -> EngineConfig;
}

/// ConfigPort over a fixed snapshot.
pub struct StaticConfig {
    config: EngineConfig,
}

impl StaticConfig {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl ConfigPort for StaticConfig {
    fn snapshot(&self) -> EngineConfig {
        self.config.clone()
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load from file (when set) and environment, then validate.
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| EngineError::Configuration(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> EngineResult<()> {
        if let Ok(raw) = env::var("FAIRPLAY_MIN_BET_UNITS") {
            config.min_bet = Amount::from_units(parse_env("FAIRPLAY_MIN_BET_UNITS", &raw)?);
        }
        if let Ok(raw) = env::var("FAIRPLAY_MAX_BET_UNITS") {
            config.max_bet = Amount::from_units(parse_env("FAIRPLAY_MAX_BET_UNITS", &raw)?);
        }
        if let Ok(raw) = env::var("FAIRPLAY_FEE_UNITS") {
            config.fee_per_play = Amount::from_units(parse_env("FAIRPLAY_FEE_UNITS", &raw)?);
        }
        if let Ok(raw) = env::var("FAIRPLAY_FREE_PLAYS_PER_DAY") {
            config.free_plays_per_day = parse_env("FAIRPLAY_FREE_PLAYS_PER_DAY", &raw)? as u32;
        }
        if let Ok(raw) = env::var("FAIRPLAY_POOL_CAPACITY") {
            config.pool_capacity = parse_env("FAIRPLAY_POOL_CAPACITY", &raw)? as usize;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env(field: &str, raw: &str) -> EngineResult<u64> {
    raw.parse().map_err(|_| {
        EngineError::Configuration(format!("Invalid value for {}: '{}'", field, raw))
    })
}

/// Validate a configuration snapshot before the engine accepts it.
pub fn validate(config: &EngineConfig) -> EngineResult<()> {
    if config.min_bet > config.max_bet {
        return Err(EngineError::Configuration(format!(
            "min_bet {} exceeds max_bet {}",
            config.min_bet, config.max_bet
        )));
    }
    if config.segments.is_empty() {
        return Err(EngineError::Configuration(
            "segment table cannot be empty".to_string(),
        ));
    }
    if config.segments.iter().any(|s| s.weight == 0) {
        return Err(EngineError::Configuration(
            "segment weights must be positive".to_string(),
        ));
    }
    if config.pool_capacity == 0 {
        return Err(EngineError::Configuration(
            "pool_capacity cannot be zero".to_string(),
        ));
    }
    if config.draw_winner_count == 0 || config.draw_winner_count > config.pool_capacity {
        return Err(EngineError::Configuration(format!(
            "draw_winner_count {} must be in 1..={}",
            config.draw_winner_count, config.pool_capacity
        )));
    }
    if config.prize_splits_bps.len() != config.draw_winner_count {
        return Err(EngineError::Configuration(format!(
            "prize_splits_bps has {} entries but draw_winner_count is {}",
            config.prize_splits_bps.len(),
            config.draw_winner_count
        )));
    }
    let split_total: u64 = config.prize_splits_bps.iter().sum();
    if split_total > BPS_DENOM {
        return Err(EngineError::Configuration(format!(
            "prize splits sum to {} bps, above the {} bps pot",
            split_total, BPS_DENOM
        )));
    }
    if config.ticket_price.is_zero() {
        return Err(EngineError::Configuration(
            "ticket_price cannot be zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.pool_capacity, 10);
        assert_eq!(config.prize_splits_bps.len(), config.draw_winner_count);
    }

    #[test]
    fn test_validation_rejects_inverted_bounds() {
        let mut config = EngineConfig::default();
        config.min_bet = Amount::from_whole(2_000);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_weight() {
        let mut config = EngineConfig::default();
        config.segments[0].weight = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_over_allocated_pot() {
        let mut config = EngineConfig::default();
        config.prize_splits_bps = vec![6_000, 4_000, 1_000];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_split_count_mismatch() {
        let mut config = EngineConfig::default();
        config.prize_splits_bps = vec![10_000];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();
        let loaded: EngineConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_static_config_snapshot() {
        let port = StaticConfig::new(EngineConfig::default());
        assert_eq!(port.snapshot(), EngineConfig::default());
    }
}
