//! Native currency amounts
//!
//! Balances and transfer amounts are held in base units (`u128`), with
//! 18 decimal places between a base unit and one coin.

use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

/// Amount of native currency in base units
pub type Amount = u128;

/// Decimal places of the native currency
pub const DECIMALS: u32 = 18;

/// One whole coin in base units
pub const ONE_COIN: Amount = 1_000_000_000_000_000_000;

/// Errors from parsing a human-readable amount
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("Too many decimal places (max 18): {0}")]
    TooPrecise(String),
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// Parse a coin amount such as `"1.5"` into base units.
pub fn parse_amount(amount: &str) -> Result<Amount, AmountError> {
    let amount = amount.trim();
    let parts: Vec<&str> = amount.split('.').collect();

    if amount.is_empty() || parts.len() > 2 {
        return Err(AmountError::InvalidFormat(amount.to_string()));
    }

    let whole = if parts[0].is_empty() {
        0
    } else {
        parts[0]
            .parse::<u128>()
            .map_err(|_| AmountError::InvalidFormat(amount.to_string()))?
    };

    let fraction = match parts.get(1) {
        Some(digits) => {
            if digits.len() > DECIMALS as usize {
                return Err(AmountError::TooPrecise(amount.to_string()));
            }
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(AmountError::InvalidFormat(amount.to_string()));
            }
            let padded = format!("{:0<width$}", digits, width = DECIMALS as usize);
            padded
                .parse::<u128>()
                .map_err(|_| AmountError::InvalidFormat(amount.to_string()))?
        }
        None => 0,
    };

    whole
        .checked_mul(ONE_COIN)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))
}

/// Format base units as a coin amount, trimming trailing zeros.
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / ONE_COIN;
    let remainder = amount % ONE_COIN;

    if remainder == 0 {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", remainder, width = DECIMALS as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Serde adapter that writes amounts as decimal strings.
///
/// Tagged enums buffer their content before decoding, and that buffer
/// cannot hold integers wider than 64 bits.
pub mod as_string {
    use super::*;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1").unwrap(), ONE_COIN);
        assert_eq!(parse_amount("0.1").unwrap(), ONE_COIN / 10);
        assert_eq!(parse_amount("1.5").unwrap(), ONE_COIN * 3 / 2);
        assert_eq!(parse_amount(".25").unwrap(), ONE_COIN / 4);
        assert_eq!(parse_amount("0.000000000000000001").unwrap(), 1);
    }

    #[test]
    fn test_parse_amount_errors() {
        assert!(matches!(parse_amount(""), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_amount("1.2.3"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_amount("1."), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_amount("abc"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(
            parse_amount("0.0000000000000000001"),
            Err(AmountError::TooPrecise(_))
        ));
        assert!(matches!(
            parse_amount("999999999999999999999999"),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(ONE_COIN), "1");
        assert_eq!(format_amount(ONE_COIN * 3 / 2), "1.5");
        assert_eq!(format_amount(ONE_COIN / 10), "0.1");
        assert_eq!(format_amount(1), "0.000000000000000001");
    }

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    #[serde(tag = "type")]
    enum Tagged {
        Big {
            #[serde(with = "as_string")]
            amount: Amount,
        },
    }

    #[test]
    fn test_string_adapter_survives_tagged_enums() {
        let value = Tagged::Big {
            amount: u128::MAX,
        };
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains(&u128::MAX.to_string()));
        assert_eq!(serde_json::from_str::<Tagged>(&json).unwrap(), value);
    }
}
