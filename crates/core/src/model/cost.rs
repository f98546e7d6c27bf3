use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// A currency amount with exactly four fractional digits.
///
/// Stored as whole ten-thousandths of a currency unit so sums and comparisons
/// are exact. Serialized as a plain JSON number (`0.0013`).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost(u64);

impl Cost {
    /// Number of stored units per currency unit.
    pub const SCALE: u64 = 10_000;

    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_ten_thousandths(units: u64) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn ten_thousandths(self) -> u64 {
        self.0
    }

    /// Round a decimal amount to the nearest ten-thousandth.
    ///
    /// Returns `None` for negative or non-finite input.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_f64_rounded(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let scaled = (amount * Self::SCALE as f64).round();
        Some(Self(scaled as u64))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl Add for Cost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Cost> for Cost {
    fn sum<I: Iterator<Item = &'a Cost>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Debug for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cost({self})")
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Cost::from_f64_rounded(amount)
            .ok_or_else(|| de::Error::custom(format!("invalid cost amount: {amount}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_four_fraction_digits() {
        assert_eq!(Cost::from_ten_thousandths(13).to_string(), "0.0013");
        assert_eq!(Cost::from_ten_thousandths(120).to_string(), "0.0120");
        assert_eq!(Cost::from_ten_thousandths(123_456).to_string(), "12.3456");
    }

    #[test]
    fn sums_exactly() {
        let total: Cost = [1, 2, 3].into_iter().map(Cost::from_ten_thousandths).sum();
        assert_eq!(total, Cost::from_ten_thousandths(6));
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Cost::from_ten_thousandths(13)).unwrap();
        assert_eq!(json, "0.0013");
        let parsed: Cost = serde_json::from_str("0.012").unwrap();
        assert_eq!(parsed, Cost::from_ten_thousandths(120));
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(serde_json::from_str::<Cost>("-0.5").is_err());
        assert_eq!(Cost::from_f64_rounded(f64::NAN), None);
    }
}
