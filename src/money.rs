//! Money Conversion Module
//!
//! All monetary values are `rust_decimal::Decimal` amounts in SAR with at
//! most two fractional digits (halalas). The payment gateway speaks integer
//! minor units (`amount_cents`), so every conversion to and from the
//! gateway goes through here.
//!
//! ## Usage
//! ```ignore
//! use shares_settlement::money::{parse_amount, to_minor_units};
//!
//! let amount = parse_amount("100.50")?;
//! assert_eq!(to_minor_units(amount)?, 10_050);
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits of the settlement currency (SAR -> halala)
pub const CURRENCY_DECIMALS: u32 = 2;

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Parse a client-supplied amount string ("100", "99.5", "0.01").
pub fn parse_amount(raw: &str) -> Result<Decimal, MoneyError> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|_| MoneyError::InvalidFormat(raw.to_string()))?;
    validate_amount(value)
}

/// Check that an amount is strictly positive and representable in halalas.
pub fn validate_amount(value: Decimal) -> Result<Decimal, MoneyError> {
    if value <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }
    let normalized = value.normalize();
    if normalized.scale() > CURRENCY_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: CURRENCY_DECIMALS,
        });
    }
    Ok(normalized)
}

/// SAR -> halalas, as expected by the gateway's `amount_cents`.
pub fn to_minor_units(value: Decimal) -> Result<i64, MoneyError> {
    let scaled = value
        .checked_mul(Decimal::from(10i64.pow(CURRENCY_DECIMALS)))
        .ok_or(MoneyError::Overflow)?;
    if scaled.fract() != Decimal::ZERO {
        return Err(MoneyError::PrecisionOverflow {
            provided: value.normalize().scale(),
            max: CURRENCY_DECIMALS,
        });
    }
    scaled.to_i64().ok_or(MoneyError::Overflow)
}

/// Halalas -> SAR
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, CURRENCY_DECIMALS)
}

/// Display format used in notifications and API responses ("208.00").
pub fn format_amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(CURRENCY_DECIMALS))
}

/// Split `total` across `weights` proportionally, rounded to halalas.
///
/// The last slot absorbs the rounding remainder so the parts always sum to
/// `total` exactly. Returns an empty vector when the weights sum to zero.
pub fn split_pro_rata(total: Decimal, weights: &[i64]) -> Vec<Decimal> {
    let weight_sum: i64 = weights.iter().sum();
    if weights.is_empty() || weight_sum <= 0 {
        return Vec::new();
    }

    let mut parts = Vec::with_capacity(weights.len());
    let mut allocated = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        if i + 1 == weights.len() {
            parts.push(total - allocated);
        } else {
            let part = (total * Decimal::from(*weight) / Decimal::from(weight_sum))
                .round_dp_with_strategy(CURRENCY_DECIMALS, RoundingStrategy::ToZero);
            allocated += part;
            parts.push(part);
        }
    }
    parts
}
