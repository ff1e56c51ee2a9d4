//! # Money Module
//!
//! Provides [`Money`] (integer céntimos) and [`UnitCost`] (four-decimal unit
//! cost used by the kardex).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  A boleta of 3 × S/ 3.90 must print S/ 11.70, every time, and the      │
//! │  tax authority recomputes our totals to the céntimo.                    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer céntimos, rounded only at monetary boundaries   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Prices Include IGV
//! Peruvian shelf prices are tax-inclusive. The tax-exclusive "valor
//! unitario" is derived with `gross / (1 + rate)`:
//!
//! ```rust
//! use facturo_core::money::Money;
//! use facturo_core::types::TaxRate;
//!
//! let price = Money::from_cents(1180);               // S/ 11.80
//! assert_eq!(price.net_of_tax(TaxRate::IGV).cents(), 1000);
//! assert_eq!(Money::from_cents(1000).gross_of_tax(TaxRate::IGV).cents(), 1180);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Basis-point denominator (10000 bps = 100%).
const BPS_SCALE: i128 = 10_000;

/// Rounds `numerator / denominator` half away from zero.
///
/// `denominator` must be positive.
pub(crate) fn div_round(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    if numerator >= 0 {
        (numerator * 2 + denominator) / (denominator * 2)
    } else {
        -((-numerator * 2 + denominator) / (denominator * 2))
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in céntimos (1/100 of a sol).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for adjustments
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                    Where Money is Used                                  │
/// │                                                                         │
/// │  Product.price_cents ──► LineValuation (unit value, IGV, total)        │
/// │                                  │                                      │
/// │                                  ▼                                      │
/// │  Document totals (gravada, exonerada, IGV) ──► saldo ──► Payment       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from céntimos.
    ///
    /// ```rust
    /// use facturo_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // S/ 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from soles and céntimos.
    ///
    /// For negative amounts, only the major unit should be negative.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in céntimos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole soles portion.
    #[inline]
    pub const fn soles(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the céntimos portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax on a tax-exclusive amount, rounding half up.
    ///
    /// ```rust
    /// use facturo_core::money::Money;
    /// use facturo_core::types::TaxRate;
    ///
    /// // S/ 10.00 × 18% = S/ 1.80
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::IGV);
    /// assert_eq!(tax.cents(), 180);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money(div_round(self.0 as i128 * rate.bps() as i128, BPS_SCALE) as i64)
    }

    /// Strips tax from a tax-inclusive amount: `round(gross / (1 + rate))`.
    ///
    /// ## Rounding
    /// Computed as `gross × 10000 / (10000 + bps)` in integer math so the
    /// only rounding step is the final céntimo.
    pub fn net_of_tax(&self, rate: TaxRate) -> Money {
        if rate.is_zero() {
            return *self;
        }
        let denominator = BPS_SCALE + rate.bps() as i128;
        Money(div_round(self.0 as i128 * BPS_SCALE, denominator) as i64)
    }

    /// Adds tax to a tax-exclusive amount.
    pub fn gross_of_tax(&self, rate: TaxRate) -> Money {
        *self + self.calculate_tax(rate)
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use facturo_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(390); // S/ 3.90
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 1170);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        let discount_amount = div_round(self.0 as i128 * discount_bps as i128, BPS_SCALE);
        Money(self.0 - discount_amount as i64)
    }

    /// Returns the smaller of two values.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as "S/ 10.99" (for logs; receipts format elsewhere).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}S/ {}.{:02}", sign, self.soles().abs(), self.cents_part())
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Cost
// =============================================================================

/// A unit cost with four decimals (ten-thousandths of a sol).
///
/// ## Why Four Decimals?
/// Weighted-average cost is a ratio. Rounding it to céntimos on every
/// INGRESO drifts the inventory value; four decimals keep the drift below
/// a céntimo per hundred units.
///
/// ```rust
/// use facturo_core::money::UnitCost;
///
/// let cost = UnitCost::from_scaled(81_667);
/// assert_eq!(cost.to_string(), "8.1667");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnitCost(i64);

impl UnitCost {
    /// Number of scaled units per sol.
    pub const SCALE: i64 = 10_000;

    /// Creates a cost from ten-thousandths of a sol.
    #[inline]
    pub const fn from_scaled(scaled: i64) -> Self {
        UnitCost(scaled)
    }

    /// Creates a cost from a céntimo amount.
    #[inline]
    pub const fn from_money(money: Money) -> Self {
        UnitCost(money.cents() * 100)
    }

    /// Returns the raw ten-thousandths value.
    #[inline]
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Zero cost.
    #[inline]
    pub const fn zero() -> Self {
        UnitCost(0)
    }

    /// Rounds to céntimos.
    pub fn to_money(&self) -> Money {
        Money::from_cents(div_round(self.0 as i128, 100) as i64)
    }

    /// Value of `quantity` units at this cost, rounded to céntimos.
    pub fn total_for(&self, quantity: i64) -> Money {
        Money::from_cents(div_round(self.0 as i128 * quantity as i128, 100) as i64)
    }

    /// Blends an inflow into an existing average.
    ///
    /// `newCost = (stock·cost + qty·unitCost) / (stock + qty)`, rounded half
    /// up to four decimals. A non-positive resulting stock keeps the
    /// incoming cost.
    ///
    /// ```rust
    /// use facturo_core::money::UnitCost;
    ///
    /// // 50 units @ 8.00 + 10 units @ 9.00 = 60 units @ 8.1667
    /// let cost = UnitCost::weighted_average(
    ///     50, UnitCost::from_scaled(80_000),
    ///     10, UnitCost::from_scaled(90_000),
    /// );
    /// assert_eq!(cost.scaled(), 81_667);
    /// ```
    pub fn weighted_average(
        stock_before: i64,
        cost_before: UnitCost,
        quantity: i64,
        unit_cost: UnitCost,
    ) -> UnitCost {
        let base_stock = stock_before.max(0) as i128;
        let total_units = base_stock + quantity as i128;
        if total_units <= 0 {
            return unit_cost;
        }
        let total_value = base_stock * cost_before.0 as i128 + quantity as i128 * unit_cost.0 as i128;
        UnitCost(div_round(total_value, total_units) as i64)
    }
}

impl fmt::Display for UnitCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:04}", sign, abs / Self::SCALE, abs % Self::SCALE)
    }
}

impl Default for UnitCost {
    fn default() -> Self {
        UnitCost::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
