//! # Money Module
//!
//! Provides the `Money` type for monetary values and the `Rate` type for
//! percentages.
//!
//! ## Two Precisions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WHERE EACH REPRESENTATION LIVES                                        │
//! │                                                                         │
//! │  Money (i64 cents)                                                      │
//! │    • Every persisted amount (orders, prices, coupons)                   │
//! │    • Every amount exposed on a Quote                                    │
//! │    • Every amount sent to a payment gateway                             │
//! │                                                                         │
//! │  Decimal (exact, in cents)                                              │
//! │    • Only INSIDE a quote computation                                    │
//! │    • 15% off 333 cents = 283.05 cents, kept exact until exposed         │
//! │                                                                         │
//! │  Decimal ──► Money::from_decimal_cents() ──► banker's rounding          │
//! │                                                                         │
//! │  Rounding once at the edge means 100 lines of 283.05 sum to 28305,      │
//! │  not 28300 (which is what rounding every line would give).             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use settle_core::money::{Money, Rate};
//!
//! let price = Money::from_cents(10_000); // 100.00
//! let line = price.multiply_quantity(12); // 1200.00
//!
//! let rate = Rate::from_percent(15);
//! let discounted = line.to_decimal() * (rate.complement());
//! assert_eq!(Money::from_decimal_cents(discounted).cents(), 102_000);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: savings and refunds are computed as differences
/// - **Single field tuple struct**: zero-cost over i64
/// - **No float constructor**: prices arrive as cents from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use settle_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds an exact cent amount to whole cents (round half to even).
    ///
    /// ## Why Banker's Rounding?
    /// ```text
    /// 0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4
    /// ```
    /// Always rounding halves up biases every discounted line by up to half
    /// a cent in the shop's disfavour; rounding to even cancels out.
    ///
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use settle_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal_cents(Decimal::new(2825, 1)).cents(), 282); // 282.5
    /// assert_eq!(Money::from_decimal_cents(Decimal::new(2835, 1)).cents(), 284); // 283.5
    /// ```
    pub fn from_decimal_cents(exact: Decimal) -> Self {
        let rounded = exact.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
        let cents = rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        });
        Money(cents)
    }

    /// Returns the exact value in cents as a Decimal.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use settle_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Clamps the amount into `[floor, ceiling]`.
    #[inline]
    pub fn clamp(self, floor: Money, ceiling: Money) -> Money {
        Money(self.0.clamp(floor.0, ceiling.0.max(floor.0)))
    }
}

/// Display shows the amount with two decimals and no currency symbol
/// (the engine is single-currency and the symbol belongs to presentation).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage in basis points (1 bp = 0.01%, 1500 bps = 15%).
///
/// Used by percentage quantity rules and percentage coupons. A rate above
/// 100% can exist in storage (records are validated only when written), so
/// callers check [`Rate::is_valid_percentage`] before applying one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// 100% in basis points.
    pub const FULL_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage (15 → 15%).
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        Rate(percent * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// True for 0% through 100% inclusive.
    #[inline]
    pub const fn is_valid_percentage(&self) -> bool {
        self.0 <= Self::FULL_BPS
    }

    /// The rate as an exact fraction (1500 bps → 0.15).
    pub fn fraction(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(Self::FULL_BPS)
    }

    /// One minus the rate (1500 bps → 0.85), the multiplier for a discount.
    pub fn complement(&self) -> Decimal {
        Decimal::ONE - self.fraction()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_bankers_rounding_at_the_edge() {
        assert_eq!(Money::from_decimal_cents(Decimal::new(5, 1)).cents(), 0);
        assert_eq!(Money::from_decimal_cents(Decimal::new(15, 1)).cents(), 2);
        assert_eq!(Money::from_decimal_cents(Decimal::new(25, 1)).cents(), 2);
        assert_eq!(Money::from_decimal_cents(Decimal::new(28306, 2)).cents(), 283);
    }

    /// Rounding each line loses what rounding once keeps.
    #[test]
    fn test_accumulate_then_round() {
        // 15% off 333 cents = 283.05 cents
        let line = Money::from_cents(333).to_decimal() * Rate::from_percent(15).complement();
        assert_eq!(line, Decimal::new(28305, 2));

        let exact_sum: Decimal = (0..100).map(|_| line).sum();
        let rounded_per_line: i64 = (0..100).map(|_| Money::from_decimal_cents(line).cents()).sum();

        assert_eq!(Money::from_decimal_cents(exact_sum).cents(), 28305);
        assert_eq!(rounded_per_line, 28300);
    }

    #[test]
    fn test_rate() {
        let rate = Rate::from_percent(15);
        assert_eq!(rate.bps(), 1500);
        assert_eq!(rate.fraction(), Decimal::new(15, 2));
        assert_eq!(rate.complement(), Decimal::new(85, 2));
        assert!(rate.is_valid_percentage());
        assert!(!Rate::from_bps(10_001).is_valid_percentage());
        assert_eq!(Rate::from_bps(1250).to_string(), "12.50%");
    }

    #[test]
    fn test_clamp() {
        let floor = Money::zero();
        let ceiling = Money::from_cents(600);
        assert_eq!(Money::from_cents(-5).clamp(floor, ceiling), floor);
        assert_eq!(Money::from_cents(900).clamp(floor, ceiling), ceiling);
        assert_eq!(Money::from_cents(50).clamp(floor, ceiling).cents(), 50);
    }
}
