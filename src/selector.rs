//! Deterministic outcome selection.
//!
//! Every draw maps `(server_seed, client_seed, nonce, counter)` through
//! HMAC-SHA256 to a uniform value in `[0, 1)`, kept as the integer numerator
//! of a fraction over 2^53. Selection compares fractions with u128
//! cross-multiplication, so no IEEE-754 float ever touches an outcome.
//!
//! Pure functions, no I/O, no clock: repeated invocation with the same
//! inputs yields the identical outcome.

use crate::amount::Amount;
use crate::errors::{EngineError, EngineResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Denominator of every uniform draw: 2^53.
pub const DRAW_DENOM: u64 = 1 << 53;

/// One weighted wheel segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    /// Integer weight; share of the wheel is weight / sum(weights).
    pub weight: u64,
    /// Payout multiplier applied to the bet, fixed-point 8 dp.
    pub multiplier: Amount,
}

/// A uniform value in `[0, 1)` represented as `numer / 2^53`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDraw {
    pub numer: u64,
}

impl UniformDraw {
    /// Approximate float view, for diagnostics and statistical tests only.
    pub fn as_f64(self) -> f64 {
        self.numer as f64 / DRAW_DENOM as f64
    }
}

/// Derive the `counter`-th independent uniform draw for a commitment.
///
/// Message layout is `client_seed ':' nonce ':' counter`; the server seed is
/// the HMAC key. The first 8 bytes of the MAC, big-endian, reduced mod 2^53,
/// form the numerator.
pub fn uniform_draw(server_seed: &str, client_seed: &str, nonce: u64, counter: u64) -> UniformDraw {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    let message = format!("{}:{}:{}", client_seed, nonce, counter);
    mac.update(message.as_bytes());
    let bytes = mac.finalize().into_bytes();

    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    UniformDraw {
        numer: u64::from_be_bytes(raw) % DRAW_DENOM,
    }
}

/// Map a uniform draw onto a weighted segment table.
///
/// Segment `i` owns the half-open range `[cum_{i-1}, cum_i) / total`:
/// left-inclusive, so a draw landing exactly on a boundary resolves to the
/// lower segment with no randomness in the tie-break.
pub fn select_segment(segments: &[Segment], draw: UniformDraw) -> EngineResult<usize> {
    if segments.is_empty() {
        return Err(EngineError::Configuration(
            "segment table is empty".to_string(),
        ));
    }
    let total: u64 = segments.iter().map(|s| s.weight).sum();
    if total == 0 {
        return Err(EngineError::Configuration(
            "segment table has zero total weight".to_string(),
        ));
    }

    // draw < cum/total  <=>  numer * total < cum * 2^53
    let scaled = draw.numer as u128 * total as u128;
    let mut cumulative: u128 = 0;
    for (index, segment) in segments.iter().enumerate() {
        cumulative += segment.weight as u128;
        if scaled < cumulative * DRAW_DENOM as u128 {
            return Ok(index);
        }
    }

    // Unreachable for numer < 2^53 and total > 0; guard anyway.
    Ok(segments.len() - 1)
}

/// Map a uniform draw onto one of `len` equally likely indexes.
fn select_index(len: usize, draw: UniformDraw) -> usize {
    debug_assert!(len > 0);
    (draw.numer as u128 * len as u128 / DRAW_DENOM as u128) as usize
}

/// Draw `count` winners from `candidates` without replacement.
///
/// Each placement consumes one independent uniform draw (counter 0, 1, ...)
/// and removes the selected candidate before the next draw, so winners are
/// pairwise distinct across placements.
pub fn draw_winners(
    candidates: &[String],
    count: usize,
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
) -> EngineResult<Vec<String>> {
    if count > candidates.len() {
        return Err(EngineError::Configuration(format!(
            "cannot draw {} winners from {} candidates",
            count,
            candidates.len()
        )));
    }

    let mut remaining: Vec<String> = candidates.to_vec();
    let mut winners = Vec::with_capacity(count);
    for counter in 0..count as u64 {
        let draw = uniform_draw(server_seed, client_seed, nonce, counter);
        let index = select_index(remaining.len(), draw);
        winners.push(remaining.remove(index));
    }
    Ok(winners)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segments() -> Vec<Segment> {
        vec![
            Segment {
                weight: 1,
                multiplier: Amount::ZERO,
            },
            Segment {
                weight: 1,
                multiplier: Amount::from_whole(2),
            },
        ]
    }

    #[test]
    fn test_uniform_draw_deterministic() {
        let a = uniform_draw("server", "client", 7, 0);
        let b = uniform_draw("server", "client", 7, 0);
        assert_eq!(a, b);
        assert!(a.numer < DRAW_DENOM);

        // Different counter gives an independent value.
        let c = uniform_draw("server", "client", 7, 1);
        assert_ne!(a.numer, c.numer);
    }

    #[test]
    fn test_segment_boundaries_left_inclusive() {
        let segments = two_segments();

        // Exactly 0.5 belongs to the second segment: [0, 0.5), [0.5, 1).
        let mid = UniformDraw {
            numer: DRAW_DENOM / 2,
        };
        assert_eq!(select_segment(&segments, mid).unwrap(), 1);

        // Just below the boundary stays in the first.
        let below = UniformDraw {
            numer: DRAW_DENOM / 2 - 1,
        };
        assert_eq!(select_segment(&segments, below).unwrap(), 0);

        // Zero maps to the first segment; the top of the range to the last.
        assert_eq!(
            select_segment(&segments, UniformDraw { numer: 0 }).unwrap(),
            0
        );
        assert_eq!(
            select_segment(
                &segments,
                UniformDraw {
                    numer: DRAW_DENOM - 1
                }
            )
            .unwrap(),
            1
        );
    }

    #[test]
    fn test_segment_frequencies_converge_to_weights() {
        // chi-square goodness of fit over 100k draws with fixed seeds,
        // varying only the nonce. df = 3, critical value at p=0.001 is 16.27;
        // a generous bound still catches a broken selector.
        let segments = vec![
            Segment {
                weight: 1,
                multiplier: Amount::ZERO,
            },
            Segment {
                weight: 2,
                multiplier: Amount::from_whole(1),
            },
            Segment {
                weight: 3,
                multiplier: Amount::from_whole(2),
            },
            Segment {
                weight: 4,
                multiplier: Amount::from_whole(3),
            },
        ];
        let total_weight: u64 = segments.iter().map(|s| s.weight).sum();

        const N: u64 = 100_000;
        let mut observed = [0u64; 4];
        for nonce in 0..N {
            let draw = uniform_draw("chi-square-server-seed", "chi-square-client", nonce, 0);
            let index = select_segment(&segments, draw).unwrap();
            observed[index] += 1;
        }

        let mut chi2 = 0.0f64;
        for (i, segment) in segments.iter().enumerate() {
            let expected = N as f64 * segment.weight as f64 / total_weight as f64;
            let diff = observed[i] as f64 - expected;
            chi2 += diff * diff / expected;
        }
        assert!(chi2 < 16.27, "chi-square {} too high: {:?}", chi2, observed);
    }

    #[test]
    fn test_selection_is_pure() {
        let segments = two_segments();
        let first = select_segment(&segments, uniform_draw("s", "c", 3, 0)).unwrap();
        for _ in 0..10 {
            let again = select_segment(&segments, uniform_draw("s", "c", 3, 0)).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_draw_winners_pairwise_distinct() {
        let tickets: Vec<String> = (0..10).map(|i| format!("ticket-{}", i)).collect();

        for nonce in 0..200 {
            let winners = draw_winners(&tickets, 3, "seed", "clients", nonce).unwrap();
            assert_eq!(winners.len(), 3);
            assert_ne!(winners[0], winners[1]);
            assert_ne!(winners[0], winners[2]);
            assert_ne!(winners[1], winners[2]);
        }
    }

    #[test]
    fn test_draw_winners_deterministic_order() {
        let tickets: Vec<String> = (0..5).map(|i| format!("t{}", i)).collect();
        let a = draw_winners(&tickets, 3, "seed", "c", 1).unwrap();
        let b = draw_winners(&tickets, 3, "seed", "c", 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_draw_winners_too_many_requested() {
        let tickets = vec!["only-one".to_string()];
        assert!(draw_winners(&tickets, 2, "s", "c", 0).is_err());
    }

    #[test]
    fn test_empty_segment_table_rejected() {
        let draw = UniformDraw { numer: 0 };
        assert!(select_segment(&[], draw).is_err());
    }
}
