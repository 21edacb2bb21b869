use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Decimal places kept for every amount.
const SCALE: u32 = 2;

/// A non-negative currency amount with two decimal places.
///
/// Fee balances, late fees, and policy rates all use `Money`. A negative
/// amount cannot be constructed, so a balance typed as `Money` can never
/// go below zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount, rounding half away from zero to two decimal places.
    pub fn new(amount: Decimal) -> Result<Self, TypeError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(TypeError::NegativeAmount(amount.to_string()));
        }
        Ok(Self(
            amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    /// Create a strictly positive amount (fee charges and payments).
    pub fn positive(amount: Decimal) -> Result<Self, TypeError> {
        let money = Self::new(amount)?;
        if money.is_zero() {
            return Err(TypeError::NonPositiveAmount(amount.to_string()));
        }
        Ok(money)
    }

    /// Create from a whole number of cents.
    pub fn from_cents(cents: u64) -> Self {
        Self(Decimal::from_i128_with_scale(i128::from(cents), SCALE))
    }

    /// The underlying decimal value.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns `true` if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add two amounts.
    pub fn checked_add(self, other: Self) -> Result<Self, TypeError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(TypeError::Overflow)
    }

    /// Subtract `other`, refusing to go below zero.
    pub fn checked_sub(self, other: Self) -> Result<Self, TypeError> {
        if other > self {
            return Err(TypeError::Underflow {
                lhs: self.to_string(),
                rhs: other.to_string(),
            });
        }
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(TypeError::Overflow)
    }

    /// Multiply by a whole count (e.g. a per-day rate times days late).
    pub fn times(self, count: u32) -> Result<Self, TypeError> {
        self.0
            .checked_mul(Decimal::from(count))
            .map(Self)
            .ok_or(TypeError::Overflow)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<Decimal> for Money {
    type Error = TypeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| TypeError::InvalidAmount(format!("{s}: {e}")))?;
        Self::new(decimal)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({:.2})", self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_amounts_are_rejected() {
        let err = Money::new(dec!(-0.01)).unwrap_err();
        assert!(matches!(err, TypeError::NegativeAmount(_)));
    }

    #[test]
    fn positive_rejects_zero() {
        let err = Money::positive(dec!(0)).unwrap_err();
        assert!(matches!(err, TypeError::NonPositiveAmount(_)));
        assert!(Money::positive(dec!(0.01)).is_ok());
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(Money::new(dec!(1.005)).unwrap(), Money::from_cents(101));
        assert_eq!(Money::new(dec!(1.004)).unwrap(), Money::from_cents(100));
    }

    #[test]
    fn times_multiplies_rate() {
        let rate = Money::from_cents(50);
        assert_eq!(rate.times(3).unwrap(), Money::from_cents(150));
        assert_eq!(rate.times(0).unwrap(), Money::ZERO);
    }

    #[test]
    fn sub_below_zero_is_refused() {
        let five = Money::from_cents(500);
        let ten = Money::from_cents(1000);
        assert!(matches!(
            five.checked_sub(ten).unwrap_err(),
            TypeError::Underflow { .. }
        ));
        assert_eq!(ten.checked_sub(five).unwrap(), five);
    }

    #[test]
    fn display_has_two_places() {
        assert_eq!(Money::from_cents(150).to_string(), "1.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn parses_from_str() {
        let m: Money = "0.50".parse().unwrap();
        assert_eq!(m, Money::from_cents(50));
        assert!("-1".parse::<Money>().is_err());
    }

    #[test]
    fn deserialize_validates_sign() {
        let ok: Money = serde_json::from_str("\"10.00\"").unwrap();
        assert_eq!(ok, Money::from_cents(1000));
        assert!(serde_json::from_str::<Money>("\"-3\"").is_err());
    }

    #[test]
    fn largest_cent_count_stays_positive() {
        let max = Money::from_cents(u64::MAX);
        assert!(max.amount().is_sign_positive());
        assert_eq!(max.to_string(), "184467440737095516.15");
    }

    proptest! {
        #[test]
        fn from_cents_is_never_negative(cents in any::<u64>()) {
            let money = Money::from_cents(cents);
            prop_assert!(money.amount() >= Decimal::ZERO);
            prop_assert_eq!(money.amount() * Decimal::from(100u8), Decimal::from(cents));
        }

        #[test]
        fn add_then_sub_is_identity(a in 0u64..10_000_000, b in 0u64..10_000_000) {
            let x = Money::from_cents(a);
            let y = Money::from_cents(b);
            let sum = x.checked_add(y).unwrap();
            prop_assert_eq!(sum.checked_sub(y).unwrap(), x);
        }
    }
}
