//! Integrity Validator
//!
//! Pure checks over already-parsed data:
//! - [`validate_amount`]: bounded value, fixed 2-decimal precision
//! - [`check_session_balance`]: Σ credit vs Σ debit within tolerance
//!
//! Nothing here touches the store; callers run these before any write.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{self, CURRENCY_SCALE, MoneyError};

use super::types::{Participant, SessionId};

// ============================================================================
// Validation Errors
// ============================================================================

/// Input validation errors, surfaced verbatim to the caller
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Amount is not a finite number")]
    NotFinite,

    #[error("Amount must not be negative: got {actual}")]
    Negative { actual: String },

    #[error("Amount precision exceeds {max} decimals: got {provided} decimals")]
    Precision { provided: u32, max: u32 },

    #[error("Amount {actual} out of range: expected {min} to {max}")]
    OutOfRange {
        min: Decimal,
        max: Decimal,
        actual: Decimal,
    },

    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid payment method '{value}' (expected: letters, digits, '-', '_' or space)")]
    InvalidPaymentMethod { value: String },

    #[error("Entry update must change at least one field")]
    EmptyUpdate,
}

impl From<MoneyError> for ValidationError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::NotFinite => ValidationError::NotFinite,
            MoneyError::Negative(actual) => ValidationError::Negative { actual },
            MoneyError::PrecisionOverflow { provided, max } => {
                ValidationError::Precision { provided, max }
            }
            MoneyError::Overflow => ValidationError::InvalidFormat("amount too large".into()),
            MoneyError::InvalidFormat(msg) => ValidationError::InvalidFormat(msg),
        }
    }
}

// ============================================================================
// Amount Bounds
// ============================================================================

/// Inclusive `[min, max]` range for one class of amounts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountBounds {
    pub const fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    /// Default bounds for buy-in / cash-out entries: 0.01 ..= 10,000.00
    pub const fn entry_default() -> Self {
        Self::new(
            Decimal::from_parts(1, 0, 0, false, 2),
            Decimal::from_parts(1_000_000, 0, 0, false, 2),
        )
    }

    /// Default bounds for computed transfers: 0.01 ..= 5,000.00
    pub const fn transfer_default() -> Self {
        Self::new(
            Decimal::from_parts(1, 0, 0, false, 2),
            Decimal::from_parts(500_000, 0, 0, false, 2),
        )
    }

    #[inline]
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// Validate an amount against bounds and the fixed 2-decimal precision
///
/// Returns the amount rescaled to exactly 2 decimals.
///
/// # Errors
/// * `Negative` - amount below zero
/// * `Precision` - more than 2 significant fractional digits
/// * `OutOfRange` - outside `[bounds.min, bounds.max]`
pub fn validate_amount(
    amount: Decimal,
    bounds: &AmountBounds,
) -> Result<Decimal, ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::Negative {
            actual: amount.to_string(),
        });
    }

    let scale = money::significant_scale(amount);
    if scale > CURRENCY_SCALE {
        return Err(ValidationError::Precision {
            provided: scale,
            max: CURRENCY_SCALE,
        });
    }

    if !bounds.contains(amount) {
        return Err(ValidationError::OutOfRange {
            min: bounds.min,
            max: bounds.max,
            actual: amount,
        });
    }

    Ok(money::round2(amount))
}

/// Parse a client string and validate it in one step
pub fn validate_amount_str(
    amount: &str,
    bounds: &AmountBounds,
) -> Result<Decimal, ValidationError> {
    let parsed = money::parse_amount(amount)?;
    validate_amount(parsed, bounds)
}

/// Convert a JSON number and validate it in one step
pub fn validate_amount_f64(
    amount: f64,
    bounds: &AmountBounds,
) -> Result<Decimal, ValidationError> {
    let parsed = money::amount_from_f64(amount)?;
    validate_amount(parsed, bounds)
}

/// Validate an optional payment-method tag, returning the trimmed value
pub fn validate_payment_method(method: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = method else {
        return Ok(None);
    };
    let method = raw.trim();
    if method.is_empty() || method.len() > 32 {
        return Err(ValidationError::InvalidLength {
            field: "payment_method",
            min: 1,
            max: 32,
            actual: method.len(),
        });
    }
    if !method
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ' ')
    {
        return Err(ValidationError::InvalidPaymentMethod {
            value: method.to_string(),
        });
    }
    Ok(Some(method.to_string()))
}

/// Validate a display name (session or participant)
pub fn validate_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > 64 {
        return Err(ValidationError::InvalidLength {
            field,
            min: 1,
            max: 64,
            actual: len,
        });
    }
    Ok(name.to_string())
}

// ============================================================================
// Session Balance
// ============================================================================

/// Result of the session-level credit/debit check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub session_id: SessionId,
    pub ok: bool,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    /// `total_credit - total_debit`
    pub difference: Decimal,
    pub tolerance: Decimal,
    pub message: String,
}

/// Sum participant accumulators and compare within tolerance
pub fn check_session_balance(
    session_id: SessionId,
    participants: &[Participant],
    tolerance: Decimal,
) -> BalanceReport {
    let total_credit = money::round2(participants.iter().map(|p| p.total_credit).sum());
    let total_debit = money::round2(participants.iter().map(|p| p.total_debit).sum());
    let difference = total_credit - total_debit;
    let ok = difference.abs() <= tolerance;

    let message = if ok {
        format!(
            "Session balanced: credit {} / debit {}",
            money::format_amount(total_credit),
            money::format_amount(total_debit)
        )
    } else {
        format!(
            "Session unbalanced: credit {} / debit {} (difference {} exceeds tolerance {})",
            money::format_amount(total_credit),
            money::format_amount(total_debit),
            money::format_amount(difference),
            money::format_amount(tolerance)
        )
    };

    BalanceReport {
        session_id,
        ok,
        total_credit,
        total_debit,
        difference,
        tolerance,
        message,
    }
}
