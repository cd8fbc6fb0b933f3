//! Money Conversion Module
//!
//! Every monetary value in the engine is a `rust_decimal::Decimal` held at a
//! fixed scale of [`CURRENCY_SCALE`] (2) decimal places. Conversions from client
//! input (strings, JSON numbers) and rounding of derived values MUST go through
//! this module.
//!
//! ## Design Principles
//! 1. Explicit Error Handling: no silent truncation of extra decimals
//! 2. Strict Input Format: `"12.50"` yes, `".5"`, `"5."`, `"1e2"`, `"+3"` no
//! 3. Stable Scale: [`round2`] always yields a value whose scale is exactly 2
//!
//! ## Usage
//! ```rust
//! use settle_engine::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("12.5").unwrap();
//! assert_eq!(format_amount(amount), "12.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fixed number of decimal places for every stored amount.
pub const CURRENCY_SCALE: u32 = 2;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must not be negative: {0}")]
    Negative(String),

    #[error("Amount is not a finite number")]
    NotFinite,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Parse a client amount string into a `Decimal`
///
/// The string must be plain decimal notation. Zero is accepted here; range
/// checks belong to the integrity validator.
///
/// # Errors
/// * `PrecisionOverflow` - more than [`CURRENCY_SCALE`] fractional digits
/// * `Negative` - leading minus sign
/// * `InvalidFormat` - anything that is not `digits[.digits]`
/// * `Overflow` - value does not fit in a `Decimal`
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') {
        return Err(MoneyError::Negative(amount_str.to_string()));
    }
    if amount_str.starts_with('+') {
        return Err(MoneyError::InvalidFormat("explicit sign not allowed".into()));
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (whole, frac)
        }
    };

    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }

    // REJECT extra precision instead of rounding it away
    if frac.len() > CURRENCY_SCALE as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: CURRENCY_SCALE,
        });
    }

    // 28 significant digits is the Decimal mantissa limit
    if whole.trim_start_matches('0').len() > 26 {
        return Err(MoneyError::Overflow);
    }

    let parsed = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", amount_str, e)))?;
    Ok(round2(parsed))
}

/// Convert a JSON number into a `Decimal`
///
/// Uses the shortest round-trip representation of the float, so `0.1` becomes
/// exactly `0.10` instead of `0.1000000000000000055511151231`.
pub fn amount_from_f64(value: f64) -> Result<Decimal, MoneyError> {
    if !value.is_finite() {
        return Err(MoneyError::NotFinite);
    }
    if value.is_sign_negative() && value != 0.0 {
        return Err(MoneyError::Negative(value.to_string()));
    }
    let text = value.abs().to_string();
    let frac_len = text.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
    if frac_len > CURRENCY_SCALE as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac_len as u32,
            max: CURRENCY_SCALE,
        });
    }
    let parsed = Decimal::from_str(&text).map_err(|_| MoneyError::Overflow)?;
    Ok(round2(parsed))
}

// ============================================================================
// Rounding / Inspection
// ============================================================================

/// Round half away from zero to 2 places and pin the scale at exactly 2
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Number of significant fractional digits (trailing zeros ignored)
pub fn significant_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Render an amount with exactly two decimals
pub fn format_amount(value: Decimal) -> String {
    format!("{:.prec$}", round2(value), prec = CURRENCY_SCALE as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_amount_variations() {
        assert_eq!(parse_amount("1.23").unwrap(), dec("1.23"));
        assert_eq!(parse_amount("100").unwrap(), dec("100.00"));
        assert_eq!(parse_amount("001.5").unwrap(), dec("1.50"));
        assert_eq!(parse_amount("  7.10 ").unwrap(), dec("7.10"));
        assert_eq!(parse_amount("0").unwrap(), Decimal::ZERO);
        assert_eq!(parse_amount("12.5").unwrap().scale(), 2);
    }

    #[test]
    fn parse_amount_invalid_formats() {
        let cases = [
            "1,000.00", "1.2.3", "1. 23", "+1.23", "1e2", "0x12", ".", ".5", "5.", "", "abc",
        ];
        for case in cases {
            assert!(
                parse_amount(case).is_err(),
                "Should reject invalid format: {:?}",
                case
            );
        }
    }

    #[test]
    fn parse_amount_rejects_extra_precision() {
        assert_eq!(
            parse_amount("1.234"),
            Err(MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            })
        );
    }

    #[test]
    fn parse_amount_rejects_negative() {
        assert!(matches!(parse_amount("-5.00"), Err(MoneyError::Negative(_))));
    }

    #[test]
    fn parse_amount_overflow() {
        assert_eq!(
            parse_amount("999999999999999999999999999999"),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn from_f64_uses_shortest_representation() {
        assert_eq!(amount_from_f64(0.1).unwrap(), dec("0.10"));
        assert_eq!(amount_from_f64(150.0).unwrap(), dec("150.00"));
        assert_eq!(amount_from_f64(19.99).unwrap(), dec("19.99"));
    }

    #[test]
    fn from_f64_rejects_non_finite_and_precision() {
        assert_eq!(amount_from_f64(f64::NAN), Err(MoneyError::NotFinite));
        assert_eq!(amount_from_f64(f64::INFINITY), Err(MoneyError::NotFinite));
        assert!(matches!(amount_from_f64(-1.0), Err(MoneyError::Negative(_))));
        assert!(matches!(
            amount_from_f64(0.125),
            Err(MoneyError::PrecisionOverflow { provided: 3, .. })
        ));
    }

    #[test]
    fn round2_pins_scale() {
        assert_eq!(round2(dec("1.005")).to_string(), "1.01");
        assert_eq!(round2(dec("-1.005")).to_string(), "-1.01");
        assert_eq!(round2(dec("3")).to_string(), "3.00");
        assert_eq!(round2(dec("2.50000")).to_string(), "2.50");
    }

    #[test]
    fn significant_scale_ignores_trailing_zeros() {
        assert_eq!(significant_scale(dec("1.2300")), 2);
        assert_eq!(significant_scale(dec("1.001")), 3);
        assert_eq!(significant_scale(dec("100")), 0);
    }

    #[test]
    fn format_amount_two_places() {
        assert_eq!(format_amount(dec("1.5")), "1.50");
        assert_eq!(format_amount(dec("-20")), "-20.00");
    }
}
