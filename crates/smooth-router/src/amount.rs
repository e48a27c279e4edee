//! Decimal token amounts and their integer base-unit form.
//!
//! Parsing is integer-only: the string is split on the decimal point and
//! each side is accumulated into a `U256`. No `f64` anywhere in the pipeline.

use std::cmp::Ordering;
use std::fmt;

use alloy::primitives::U256;

use crate::SmoothError;

/// 10^77 is the largest power of ten that fits in 256 bits.
pub const MAX_DECIMALS: u8 = 77;

fn scale(decimals: u8) -> Result<U256, SmoothError> {
    if decimals > MAX_DECIMALS {
        return Err(SmoothError::Range(format!(
            "{decimals} decimals exceeds the 256-bit maximum of {MAX_DECIMALS}"
        )));
    }
    Ok(U256::from(10u8).pow(U256::from(decimals)))
}

fn parse_digits(digits: &str, amount: &str) -> Result<U256, SmoothError> {
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmoothError::Range(format!(
            "invalid amount '{amount}': not a decimal number"
        )));
    }
    U256::from_str_radix(digits, 10)
        .map_err(|_| SmoothError::Range(format!("invalid amount '{amount}': exceeds 256 bits")))
}

/// Convert a human decimal amount (e.g. `"10.5"`) into base units.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, SmoothError> {
    let trimmed = amount.trim();
    if trimmed.starts_with('-') {
        return Err(SmoothError::Range(format!(
            "invalid amount '{amount}': must not be negative"
        )));
    }
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let (integer_part, fractional_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if integer_part.is_empty() && fractional_part.is_empty() {
        return Err(SmoothError::Range(format!(
            "invalid amount '{amount}': no numeric content"
        )));
    }

    let integer = parse_digits(integer_part, amount)?;
    // Validate the digits before the precision check so "1.2x" reads as malformed.
    if !fractional_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmoothError::Range(format!(
            "invalid amount '{amount}': not a decimal number"
        )));
    }

    // Trailing zeros carry no value and never cost precision.
    let significant = fractional_part.trim_end_matches('0');
    if significant.len() > decimals as usize {
        return Err(SmoothError::Precision(format!(
            "amount '{amount}' has {} fractional digits, token allows {decimals}",
            significant.len()
        )));
    }

    let multiplier = scale(decimals)?;
    let pad = decimals as usize - significant.len();
    let fractional = parse_digits(significant, amount)? * U256::from(10u8).pow(U256::from(pad));

    integer
        .checked_mul(multiplier)
        .and_then(|whole| whole.checked_add(fractional))
        .ok_or_else(|| SmoothError::Range(format!("invalid amount '{amount}': exceeds 256 bits")))
}

/// Render base units as the canonical decimal string, trailing zeros trimmed.
///
/// Inverse of [`to_base_units`] for every `decimals` up to [`MAX_DECIMALS`];
/// larger scales are a [`SmoothError::Range`], as they are when parsing.
pub fn from_base_units(units: U256, decimals: u8) -> Result<String, SmoothError> {
    let divisor = scale(decimals)?;
    Ok(render(units, decimals, divisor))
}

fn render(units: U256, decimals: u8, divisor: U256) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let integer = units / divisor;
    let fractional = units % divisor;
    if fractional.is_zero() {
        return integer.to_string();
    }
    let padded = format!("{:0>width$}", fractional.to_string(), width = decimals as usize);
    format!("{integer}.{}", padded.trim_end_matches('0'))
}

/// An unsigned token quantity with a fixed number of fractional digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    units: U256,
    decimals: u8,
}

impl TokenAmount {
    pub fn parse(amount: &str, decimals: u8) -> Result<Self, SmoothError> {
        Ok(Self {
            units: to_base_units(amount, decimals)?,
            decimals,
        })
    }

    pub fn from_base_units(units: U256, decimals: u8) -> Result<Self, SmoothError> {
        scale(decimals)?;
        Ok(Self { units, decimals })
    }

    pub fn zero(decimals: u8) -> Result<Self, SmoothError> {
        Self::from_base_units(U256::ZERO, decimals)
    }

    pub fn base_units(&self) -> U256 {
        self.units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.units.is_zero()
    }

    fn same_scale(&self, other: &Self) -> Result<(), SmoothError> {
        if self.decimals != other.decimals {
            return Err(SmoothError::Range(format!(
                "cannot combine amounts with {} and {} decimals",
                self.decimals, other.decimals
            )));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, SmoothError> {
        self.same_scale(other)?;
        let units = self
            .units
            .checked_add(other.units)
            .ok_or_else(|| SmoothError::Range(format!("{self} + {other} overflows 256 bits")))?;
        Ok(Self {
            units,
            decimals: self.decimals,
        })
    }

    /// Ordering between amounts of the same token; mismatched scales are an error.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering, SmoothError> {
        self.same_scale(other)?;
        Ok(self.units.cmp(&other.units))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Every constructor checks the scale.
        let divisor = U256::from(10u8).pow(U256::from(self.decimals));
        f.write_str(&render(self.units, self.decimals, divisor))
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({self}, {} decimals)", self.decimals)
    }
}
