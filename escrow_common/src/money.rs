use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CENTS_PER_UNIT: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A fixed-point amount with two fractional digits, stored as a whole number of cents.
///
/// All arithmetic is integer arithmetic. Amounts are parsed from and rendered to their two-decimal string form
/// (e.g. `"12.30"`) at the edges of the system.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from_cents(self.cents() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / unit, abs % unit)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (units, fraction) = match digits.split_once('.') {
            Some((u, f)) => (u, f),
            None => (digits, ""),
        };
        if units.is_empty() || !units.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(format!("'{s}' is not a decimal amount")));
        }
        if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(format!("'{s}' has more than two fractional digits")));
        }
        let overflow = || MoneyConversionError(format!("'{s}' is too large"));
        let units = units.parse::<i64>().map_err(|_| overflow())?;
        let fraction = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| overflow())? * 10,
            _ => fraction.parse::<i64>().map_err(|_| overflow())?,
        };
        let cents = units.checked_mul(CENTS_PER_UNIT).and_then(|c| c.checked_add(fraction)).ok_or_else(overflow)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * CENTS_PER_UNIT)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps the amount to the inclusive range `[min, max]`.
    pub fn clamp_to(self, min: Money, max: Money) -> Self {
        Ord::clamp(self, min, max)
    }

    /// `pct` percent of this amount, rounded half-up to the nearest cent.
    ///
    /// The computation is carried out in 128-bit integers, so it cannot overflow for any `i64` amount and a
    /// percentage in `0..=100`.
    pub fn percent_of(&self, pct: i64) -> Self {
        let product = i128::from(self.0) * i128::from(pct);
        let half = 50i128 * product.signum();
        #[allow(clippy::cast_possible_truncation)]
        Self(((product + half) / 100) as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_always_has_two_decimals() {
        assert_eq!(Money::from_cents(1230).to_string(), "12.30");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::from_units(100).to_string(), "100.00");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn parse_decimal_strings() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_cents(1200));
        assert_eq!("12.3".parse::<Money>().unwrap(), Money::from_cents(1230));
        assert_eq!("12.34".parse::<Money>().unwrap(), Money::from_cents(1234));
        assert_eq!(" -0.07 ".parse::<Money>().unwrap(), Money::from_cents(-7));
        assert!("12.345".parse::<Money>().is_err());
        assert!("1x.00".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("99999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn percentages_round_half_up() {
        let total = Money::from_units(100);
        assert_eq!(total.percent_of(70), Money::from_units(70));
        assert_eq!(total.percent_of(0), Money::zero());
        assert_eq!(total.percent_of(100), total);
        // 33% of 0.05 = 0.0165 -> 0.02
        assert_eq!(Money::from_cents(5).percent_of(33), Money::from_cents(2));
        // 50% of 0.01 = 0.005 -> 0.01
        assert_eq!(Money::from_cents(1).percent_of(50), Money::from_cents(1));
        // 10% of 0.04 = 0.004 -> 0.00
        assert_eq!(Money::from_cents(4).percent_of(10), Money::zero());
    }

    #[test]
    fn arithmetic() {
        let mut a = Money::from_units(10);
        a -= Money::from_cents(250);
        assert_eq!(a, Money::from_cents(750));
        a += Money::from_cents(50);
        assert_eq!(a, Money::from_units(8));
        assert_eq!(-a, Money::from_units(-8));
        assert_eq!(a * 3, Money::from_units(24));
        let total: Money = vec![Money::from_cents(1), Money::from_cents(2), Money::from_cents(3)].into_iter().sum();
        assert_eq!(total, Money::from_cents(6));
        assert_eq!(Money::from_units(150).clamp_to(Money::zero(), Money::from_units(100)), Money::from_units(100));
        assert_eq!(Money::from_units(-1).clamp_to(Money::zero(), Money::from_units(100)), Money::zero());
    }

    #[test]
    fn serde_as_cents() {
        let json = serde_json::to_string(&Money::from_cents(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_cents(1234));
    }
}
