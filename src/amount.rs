//! Fixed-point money arithmetic.
//!
//! Amounts are counts of 1e-8 units held in a `u64`. All multiplication and
//! division goes through `u128` intermediates and rounds down, so neither the
//! house nor the player can accumulate a fractional edge from rounding drift.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of base units per whole unit (8 fractional digits).
pub const UNITS_PER_WHOLE: u64 = 100_000_000;

/// Basis-point denominator for prize splits.
pub const BPS_DENOM: u64 = 10_000;

/// A non-negative fixed-point amount with 8 fractional digits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Construct from raw 1e-8 base units.
    pub const fn from_units(units: u64) -> Self {
        Amount(units)
    }

    /// Construct from a whole-unit count.
    pub const fn from_whole(whole: u64) -> Self {
        Amount(whole * UNITS_PER_WHOLE)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Multiply by a fixed-point multiplier (also 8 fractional digits),
    /// rounding down. `100.mul_multiplier(2x)` -> 200.
    pub fn mul_multiplier(self, multiplier: Amount) -> Amount {
        let product = self.0 as u128 * multiplier.0 as u128 / UNITS_PER_WHOLE as u128;
        Amount(product as u64)
    }

    /// Take a basis-point share of this amount, rounding down.
    pub fn mul_bps(self, bps: u64) -> Amount {
        let product = self.0 as u128 * bps as u128 / BPS_DENOM as u128;
        Amount(product as u64)
    }

    /// Multiply by an integer count (ticket price * tickets sold).
    /// `None` if the product does not fit.
    pub fn checked_mul_count(self, count: u64) -> Option<Amount> {
        self.0.checked_mul(count).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_WHOLE;
        let frac = self.0 % UNITS_PER_WHOLE;
        write!(f, "{}.{:08}", whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_and_units() {
        assert_eq!(Amount::from_whole(100).units(), 100 * UNITS_PER_WHOLE);
        assert_eq!(Amount::from_units(1).to_string(), "0.00000001");
        assert_eq!(Amount::from_whole(3).to_string(), "3.00000000");
    }

    #[test]
    fn test_mul_multiplier_rounds_down() {
        let bet = Amount::from_whole(100);
        let two_x = Amount::from_whole(2);
        assert_eq!(bet.mul_multiplier(two_x), Amount::from_whole(200));

        // 1 base unit * 1.5x = 1.5 units -> rounds down to 1.
        let dust = Amount::from_units(1);
        let one_and_half = Amount::from_units(150_000_000);
        assert_eq!(dust.mul_multiplier(one_and_half), Amount::from_units(1));

        // 0x multiplier wipes the payout.
        assert_eq!(bet.mul_multiplier(Amount::ZERO), Amount::ZERO);
    }

    #[test]
    fn test_mul_bps_rounds_down() {
        let pot = Amount::from_units(1_000);
        assert_eq!(pot.mul_bps(5_000), Amount::from_units(500));
        // 333 bps of 1000 units = 33.3 -> 33
        assert_eq!(pot.mul_bps(333), Amount::from_units(33));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Amount::from_whole(1);
        let b = Amount::from_whole(2);
        assert_eq!(a.checked_add(b), Some(Amount::from_whole(3)));
        assert_eq!(b.checked_sub(a), Some(Amount::from_whole(1)));
        assert_eq!(a.checked_sub(b), None);
    }

    #[test]
    fn test_checked_mul_count() {
        let price = Amount::from_whole(10);
        assert_eq!(price.checked_mul_count(10), Some(Amount::from_whole(100)));
        assert_eq!(price.checked_mul_count(0), Some(Amount::ZERO));

        // Overflow is reported, never truncated.
        let huge = Amount::from_units(u64::MAX);
        assert_eq!(huge.checked_mul_count(2), None);
    }
}
