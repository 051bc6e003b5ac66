use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A two-decimal currency amount. Sign is meaningful only where a caller
/// says so; imported candidates always hold a non-negative magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Rounds to whole cents, saturating at the `i64` bounds.
    pub fn to_cents(self) -> i64 {
        let saturated = if self.0.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        };
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.round().to_i64())
            .unwrap_or(saturated)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// True when the two amounts differ by at most `tolerance_cents`.
    pub fn within_cents(self, other: Money, tolerance_cents: i64) -> bool {
        self.to_cents().saturating_sub(other.to_cents()).saturating_abs() <= tolerance_cents
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-${:.2}", self.0.abs())
        } else {
            write!(f, "${:.2}", self.0)
        }
    }
}

fn saturate(sign_negative: bool) -> Decimal {
    if sign_negative {
        Decimal::MIN
    } else {
        Decimal::MAX
    }
}

// Arithmetic saturates at the `Decimal` bounds instead of panicking.
impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(
            self.0
                .checked_add(rhs.0)
                .unwrap_or_else(|| saturate(rhs.0.is_sign_negative())),
        )
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(
            self.0
                .checked_sub(rhs.0)
                .unwrap_or_else(|| saturate(!rhs.0.is_sign_negative())),
        )
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}
