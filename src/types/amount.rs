use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

/// Signed monetary amount in cents (two fixed fractional digits).
///
/// Summation is plain integer addition, so ordering never changes a total.
/// Negative values are meaningful (a member in deficit) and are never clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn to_cents(&self) -> i64 {
        self.0
    }

    /// Whole currency units, e.g. `Amount::from_major(500)` is 500.00.
    pub fn from_major(units: i64) -> Self {
        Amount(units * 100)
    }

    /// Rounds to the nearest cent; used at deserialization boundaries only.
    pub fn from_f64(value: f64) -> Self {
        Amount((value * 100.0).round() as i64)
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Whole currency units, or `None` if the amount has a fractional
    /// part. The push gateway only accepts whole units.
    pub fn as_whole_units(&self) -> Option<i64> {
        if self.0 % 100 == 0 {
            Some(self.0 / 100)
        } else {
            None
        }
    }

    pub fn zero() -> Self {
        Amount(0)
    }

    pub fn abs(&self) -> Self {
        Amount(self.0.abs())
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
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
        iter.fold(Amount::zero(), Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// On the wire amounts are plain decimal numbers (store rows, gateway payloads).
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Amount::from_f64(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_formats_cents() {
        assert_eq!(Amount::from_cents(150_050).to_string(), "1500.50");
        assert_eq!(Amount::from_cents(-150).to_string(), "-1.50");
        assert_eq!(Amount::zero().to_string(), "0.00");
        assert_eq!(Amount::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn arithmetic_is_signed() {
        let deficit = Amount::from_major(300) - Amount::from_major(500);
        assert!(deficit.is_negative());
        assert_eq!(deficit, Amount::from_major(-200));
    }

    #[test]
    fn whole_units_require_zero_fractional_part() {
        assert_eq!(Amount::from_major(750).as_whole_units(), Some(750));
        assert_eq!(Amount::from_cents(75050).as_whole_units(), None);
        assert_eq!(Amount::from_major(-3).as_whole_units(), Some(-3));
        assert_eq!(Amount::zero().as_whole_units(), Some(0));
    }

    #[test]
    fn from_f64_rounds_to_nearest_cent() {
        assert_eq!(Amount::from_f64(500.0), Amount::from_major(500));
        assert_eq!(Amount::from_f64(10.005), Amount::from_cents(1001));
    }

    proptest! {
        #[test]
        fn summation_order_does_not_matter(values in proptest::collection::vec(-1_000_000i64..1_000_000, 0..20)) {
            let forward: Amount = values.iter().map(|c| Amount::from_cents(*c)).sum();
            let reversed: Amount = values.iter().rev().map(|c| Amount::from_cents(*c)).sum();
            prop_assert_eq!(forward, reversed);
        }
    }
}
