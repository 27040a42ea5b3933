//! Fixed-point decimal price type
//!
//! Uses rust_decimal for deterministic arithmetic: floating-point money
//! would round differently across platforms and break replicated
//! execution. Serialized as a string to prevent JSON number precision
//! loss.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A non-negative fixed-point price.
///
/// Zero is a valid value (a security that has never traded carries a last
/// price of zero); order entry enforces strict positivity at the call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Create a new price from a decimal.
    ///
    /// # Panics
    /// Panics if the value is negative.
    pub fn new(value: Decimal) -> Self {
        assert!(value >= Decimal::ZERO, "Price must be non-negative");
        Self(value)
    }

    /// Try to create a price, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create from an integer (tests and fixtures)
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        let value = Decimal::from_str(s)?;
        Ok(Self::new(value))
    }

    /// Inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Decimal::ZERO
    }

    /// Monetary value of `quantity` shares at this price
    pub fn notional(&self, quantity: u64) -> Decimal {
        self.0 * Decimal::from(quantity)
    }

    /// Signed percentage change from a reference price.
    ///
    /// Returns None when the reference is zero (no meaningful baseline).
    pub fn percent_change_from(&self, reference: Price) -> Option<Decimal> {
        if reference.is_zero() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0 * Decimal::from(100))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(self.0 >= rhs.0, "Price subtraction would go negative");
        Self(self.0 - rhs.0)
    }
}

// Custom serialization to preserve precision
impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Self::try_new(value).ok_or_else(|| serde::de::Error::custom("Price must be non-negative"))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_creation() {
        let price = Price::from_u64(102);
        assert_eq!(price.as_decimal(), Decimal::from(102));
    }

    #[test]
    #[should_panic(expected = "Price must be non-negative")]
    fn test_price_negative_panics() {
        Price::new(Decimal::from(-1));
    }

    #[test]
    fn test_price_zero_allowed() {
        assert!(Price::ZERO.is_zero());
        assert!(Price::try_new(Decimal::ZERO).is_some());
    }

    #[test]
    fn test_notional() {
        let price = Price::parse("102").unwrap();
        assert_eq!(price.notional(100), Decimal::from(10_200));
    }

    #[test]
    fn test_percent_change() {
        let last = Price::from_u64(100);
        let up = Price::from_u64(110);
        assert_eq!(up.percent_change_from(last), Some(Decimal::from(10)));

        let down = Price::from_u64(95);
        assert_eq!(down.percent_change_from(last), Some(Decimal::from(-5)));
    }

    #[test]
    fn test_percent_change_no_baseline() {
        let price = Price::from_u64(50);
        assert_eq!(price.percent_change_from(Price::ZERO), None);
    }

    #[test]
    fn test_price_serialization_as_string() {
        let price = Price::parse("102.50").unwrap();
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"102.50\"");

        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
    }

    #[test]
    fn test_price_deserialization_rejects_negative() {
        assert!(serde_json::from_str::<Price>("\"-3\"").is_err());
    }

    #[test]
    fn test_deterministic_arithmetic() {
        let a = Price::parse("100.0001").unwrap().notional(3);
        let b = Price::parse("100.0001").unwrap().notional(3);
        assert_eq!(a, b);
        assert_eq!(a, Decimal::from_str("300.0003").unwrap());
    }
}
