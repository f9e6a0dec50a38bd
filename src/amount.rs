//! Token amount helpers
//!
//! Conversions between human-readable decimal strings and base-unit `U256`
//! amounts. Parsing is exact and string based; floats are only produced for
//! display and for the backend's block-size arithmetic.

use ethereum_types::U256;

use crate::error::{FlowError, FlowResult};

const BPS_DENOMINATOR: u64 = 10_000;

/// Parses a decimal string (e.g. `"12.5"`) into base units.
///
/// # Arguments
///
/// * `amount` - Human-readable amount, `.` as decimal separator
/// * `decimals` - Token decimals
///
/// # Returns
///
/// * `Ok(U256)` - Amount in base units
/// * `Err(FlowError::InvalidAmount)` - Malformed input or more fractional digits than the token has
pub fn parse_units(amount: &str, decimals: u8) -> FlowResult<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(FlowError::InvalidAmount("amount is empty".to_string()));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(FlowError::InvalidAmount(format!("'{}' is not a number", amount)));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(FlowError::InvalidAmount(format!("'{}' is not a number", amount)));
    }
    if frac.len() > decimals as usize {
        return Err(FlowError::InvalidAmount(format!(
            "'{}' has more than {} decimal places",
            amount, decimals
        )));
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(digits)
        .map_err(|_| FlowError::InvalidAmount(format!("'{}' is out of range", amount)))
}

/// Formats a base-unit amount as a decimal string without trailing zeros.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let divisor = U256::exp10(decimals as usize);
    let whole = amount / divisor;
    let frac = amount % divisor;

    if frac.is_zero() {
        return format!("{}.0", whole);
    }

    let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// Converts a float coming from the backend into base units.
///
/// The value is rendered with exactly `decimals` fractional digits before being
/// parsed, so no float multiplication by `10^decimals` happens.
pub fn decimal_to_units(value: f64, decimals: u8) -> FlowResult<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(FlowError::InvalidAmount(format!("{} is not a valid amount", value)));
    }
    parse_units(&format!("{:.*}", decimals as usize, value), decimals)
}

/// Lossy conversion to a float, for display and block-count arithmetic.
pub fn to_f64(amount: U256, decimals: u8) -> f64 {
    format_units(amount, decimals).parse::<f64>().unwrap_or(f64::MAX)
}

/// Adds a basis-point buffer: `amount * (1 + bps / 10000)`.
pub fn apply_bps_buffer(amount: U256, bps: u32) -> U256 {
    let buffer = amount.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR);
    amount.saturating_add(buffer)
}

/// Takes `bps` basis points of `amount`.
pub fn bps_of(amount: U256, bps: u64) -> U256 {
    amount.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR)
}

/// Adds a percentage margin: `gas * (100 + pct) / 100`.
pub fn with_margin_pct(gas: U256, pct: u64) -> U256 {
    gas.saturating_add(gas.saturating_mul(U256::from(pct)) / U256::from(100u64))
}

/// Rescales an amount between two decimal precisions (truncating when narrowing).
pub fn scale_decimals(amount: U256, from: u8, to: u8) -> U256 {
    if from == to {
        amount
    } else if to > from {
        amount.saturating_mul(U256::exp10((to - from) as usize))
    } else {
        amount / U256::exp10((from - to) as usize)
    }
}
