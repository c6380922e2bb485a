use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Number of 10^-8 units that make up one whole coin.
pub const UNITS_PER_COIN: i64 = 100_000_000;

/// Errors that can occur when parsing an amount literal
#[derive(Debug, Error)]
pub enum AmountError {
    #[error("Invalid amount literal: {0}")]
    InvalidLiteral(String),

    #[error("Amount has more than 8 fractional digits: {0}")]
    TooPrecise(String),
}

/// A monetary quantity with exactly 8 fractional decimal digits, stored as a
/// signed count of 10^-8 units.
///
/// Every textual rendering (`Display`, `FromStr`, all hash payloads) uses
/// the single pinned form `[-]I.FFFFFFFF`, so two parties hashing the same
/// logical value always produce identical bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Creates an amount from a raw count of 10^-8 units.
    pub fn from_units(units: i64) -> Self {
        Amount(units)
    }

    /// Creates an amount from a whole number of coins.
    pub fn from_coins(coins: i64) -> Self {
        Amount(coins * UNITS_PER_COIN)
    }

    /// The raw count of 10^-8 units.
    pub fn units(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Halves the amount, truncating toward zero at unit precision.
    pub fn halved(&self) -> Self {
        Amount(self.0 / 2)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Amount) {
        self.0 += other.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:08}",
            sign,
            abs / UNITS_PER_COIN as u64,
            abs % UNITS_PER_COIN as u64
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::InvalidLiteral(s.to_string()));
        }
        if frac_part.len() > 8 {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| AmountError::InvalidLiteral(s.to_string()))?
        };

        // Right-pad the fraction to the full 8 digits before parsing.
        let mut frac_digits = frac_part.to_string();
        while frac_digits.len() < 8 {
            frac_digits.push('0');
        }
        let frac: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_digits
                .parse()
                .map_err(|_| AmountError::InvalidLiteral(s.to_string()))?
        };
        if frac < 0 {
            return Err(AmountError::InvalidLiteral(s.to_string()));
        }

        let units = whole * UNITS_PER_COIN + frac;
        Ok(if negative { Amount(-units) } else { Amount(units) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_pinned_to_eight_digits() {
        assert_eq!(Amount::from_coins(1).to_string(), "1.00000000");
        assert_eq!(Amount::from_units(1).to_string(), "0.00000001");
        assert_eq!(Amount::from_units(312_500_000).to_string(), "3.12500000");
        assert_eq!(Amount::from_units(-100_000_001).to_string(), "-1.00000001");
    }

    #[test]
    fn test_parse_round_trip() {
        for literal in ["0.00000001", "1.00000000", "3.12500000", "10.00000000"] {
            let amount: Amount = literal.parse().unwrap();
            assert_eq!(amount.to_string(), literal);
        }
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!("10".parse::<Amount>().unwrap(), Amount::from_coins(10));
        assert_eq!("1.25".parse::<Amount>().unwrap(), Amount::from_units(125_000_000));
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount::from_units(50_000_000));
        assert_eq!("-3".parse::<Amount>().unwrap(), Amount::from_coins(-3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
        assert!("0.000000001".parse::<Amount>().is_err()); // 9 fractional digits
    }

    #[test]
    fn test_halved_truncates() {
        assert_eq!(Amount::from_coins(8).halved(), Amount::from_coins(4));
        assert_eq!(Amount::from_units(3).halved(), Amount::from_units(1));
    }

    #[test]
    fn test_sum() {
        let total: Amount = [Amount::from_coins(1), Amount::from_units(1)]
            .into_iter()
            .sum();
        assert_eq!(total, Amount::from_units(100_000_001));
    }
}
