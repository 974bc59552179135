//! Fixed-decimal types for settlement amounts.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Every value that leaves
//! the process is rendered with a fixed number of places, because the ledger
//! and the sidechain both reject amounts with the wrong precision.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Decimal places used for token and base-currency quantities.
pub const TOKEN_PRECISION: u32 = 3;

/// Decimal places used for price ratios sent to the market contract.
pub const PRICE_PRECISION: u32 = 5;

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn to_fixed(value: Decimal, dp: u32) -> String {
    let mut rounded = round_half_up(value, dp);
    rounded.rescale(dp);
    rounded.to_string()
}

/// Quantity of a token or of the base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round half away from zero to `dp` places.
    #[inline]
    pub fn round_dp(&self, dp: u32) -> Self {
        Self(round_half_up(self.0, dp))
    }

    /// Round to token precision.
    #[inline]
    pub fn round_token(&self) -> Self {
        self.round_dp(TOKEN_PRECISION)
    }

    /// Cut to token precision, rounding toward zero.
    #[inline]
    pub fn truncate_token(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(TOKEN_PRECISION, RoundingStrategy::ToZero),
        )
    }

    /// Render with exactly `dp` places, e.g. `"1.500"`.
    pub fn to_fixed(&self, dp: u32) -> String {
        to_fixed(self.0, dp)
    }

    /// Render at token precision for downstream systems.
    pub fn to_wire(&self) -> String {
        self.to_fixed(TOKEN_PRECISION)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Amount {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Amount {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

/// Price ratio (base currency per token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Price paid per unit when `cost` buys `quantity`.
    ///
    /// Returns `None` for a zero quantity.
    pub fn per_unit(cost: Amount, quantity: Amount) -> Option<Self> {
        if quantity.is_zero() {
            return None;
        }
        Some(Self(cost.0 / quantity.0))
    }

    /// Render at price precision, e.g. `"0.55275"`.
    pub fn to_wire(&self) -> String {
        to_fixed(self.0, PRICE_PRECISION)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
