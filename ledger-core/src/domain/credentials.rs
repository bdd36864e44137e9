//! Validated request primitives: PINs and amounts

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::result::{Error, Result};

/// Exact number of digits in a PIN
pub const PIN_LENGTH: usize = 4;

/// Maximum fractional digits accepted in an amount
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// A syntactically valid PIN (exactly four ASCII digits)
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Parse a submitted PIN; format errors are validation failures, not auth failures
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != PIN_LENGTH || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::validation(format!(
                "pin must be exactly {} digits",
                PIN_LENGTH
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

/// A strictly positive monetary amount with at most two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    /// Largest value a `DECIMAL(18,2)` column can hold; bounds balances too
    pub fn max() -> Decimal {
        Decimal::new(999_999_999_999_999_999, 2)
    }

    pub fn parse(value: Decimal) -> Result<Self> {
        let value = value.normalize();
        if value <= Decimal::ZERO {
            return Err(Error::validation("amount must be greater than zero"));
        }
        if value.scale() > MAX_AMOUNT_SCALE {
            return Err(Error::validation(format!(
                "amount cannot have more than {} decimal places",
                MAX_AMOUNT_SCALE
            )));
        }
        if value > Self::max() {
            return Err(Error::validation("amount is too large"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| Error::validation(format!("malformed amount: {}", s)))?;
        Self::parse(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(Pin::parse("1234").is_ok());
        assert!(Pin::parse("0000").is_ok());
        for bad in ["", "123", "12345", "12a4", " 123", "１２３４"] {
            let err = Pin::parse(bad).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::parse("1234").unwrap();
        assert!(!format!("{:?}", pin).contains("1234"));
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::parse(Decimal::new(1, 2)).is_ok());
        assert!(matches!(Amount::parse(Decimal::ZERO), Err(Error::Validation(_))));
        assert!(matches!(Amount::parse(Decimal::new(-5, 0)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_amount_scale() {
        // trailing zeros do not count against the scale
        assert_eq!(
            "10.500".parse::<Amount>().unwrap().value(),
            Decimal::new(105, 1)
        );
        assert!(matches!("0.001".parse::<Amount>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_malformed_amount_text() {
        assert!(matches!("ten".parse::<Amount>(), Err(Error::Validation(_))));
        assert!(matches!("".parse::<Amount>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_amount_upper_bound() {
        assert!(Amount::parse(Amount::max()).is_ok());
        assert!(Amount::parse(Amount::max() + Decimal::ONE).is_err());
    }
}
