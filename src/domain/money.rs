use crate::error::PlatformError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Naira are tracked to the kobo.
pub const NGN_SCALE: u32 = 2;
pub const KOBO_PER_NAIRA: Decimal = dec!(100);

/// A signed NGN balance.
///
/// Wraps `rust_decimal::Decimal` so balances cannot be confused with unit
/// counts or prices in signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive NGN amount used for payments, credits and debits.
///
/// Bounded by [`Amount::MAX`] so every amount has a kobo representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Largest amount the gateway can carry: `i64::MAX` kobo.
    pub const MAX: Decimal = Decimal::from_parts(u32::MAX, u32::MAX >> 1, 0, false, NGN_SCALE);

    pub fn new(value: Decimal) -> Result<Self, PlatformError> {
        if value <= Decimal::ZERO {
            return Err(PlatformError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value > Self::MAX {
            return Err(PlatformError::ValidationError(format!(
                "Amount must not exceed {}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Converts to the gateway's minor unit, rounding half-up to whole kobo.
    pub fn to_kobo(&self) -> Result<i64, PlatformError> {
        self.0
            .checked_mul(KOBO_PER_NAIRA)
            .map(|kobo| kobo.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|kobo| kobo.to_i64())
            .ok_or_else(|| {
                PlatformError::ValidationError(format!("{} has no kobo representation", self))
            })
    }

    pub fn from_kobo(kobo: i64) -> Result<Self, PlatformError> {
        Self::new(Decimal::new(kobo, NGN_SCALE))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PlatformError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NGN {}", self.0.round_dp(NGN_SCALE))
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Balance::ZERO, |acc, b| acc + b)
    }
}

/// Truncates to whole kobo.
pub fn floor_kobo(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(NGN_SCALE, RoundingStrategy::ToZero)
}
