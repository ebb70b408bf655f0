//! Exact conversion between integer base-unit amounts and decimal token
//! amounts. All arithmetic is done on U256; floating point never touches the
//! integer part, so balances above 2^53 base units survive a round trip.

use ethers::types::U256;

use crate::error::{AppError, Result};

/// Parse a raw RPC value ("0x..." hex or plain decimal digits) into a U256.
pub fn parse_base_units(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    if let Some(hex_digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        // eth_call against a non-contract yields an empty result; treat as zero.
        if hex_digits.is_empty() {
            return Ok(U256::zero());
        }
        return U256::from_str_radix(hex_digits, 16)
            .map_err(|_| AppError::InvalidNumericFormat(trimmed.to_string()));
    }

    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidNumericFormat(trimmed.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| AppError::InvalidNumericFormat(trimmed.to_string()))
}

/// Decode a base-unit amount into a human-readable decimal string.
///
/// The digit string is split `decimals` places from the right; shorter values
/// are left-padded with zeros, trailing fractional zeros are trimmed.
pub fn decode_base_units(raw: &str, decimals: u32) -> Result<String> {
    let value = parse_base_units(raw)?;
    Ok(format_units(value, decimals))
}

/// Render an already-parsed base-unit value at the given scale.
pub fn format_units(value: U256, decimals: u32) -> String {
    let digits = value.to_string();
    if decimals == 0 {
        return digits;
    }

    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        let padded = format!("{digits:0>width$}", width = decimals);
        ("0".to_string(), padded)
    };

    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac_trimmed}")
    }
}

/// Encode a decimal token amount back into base units, as a decimal string.
///
/// Exact inverse of [`decode_base_units`]; rejects inputs carrying more
/// fractional digits than the token has decimals.
pub fn encode_base_units(amount: &str, decimals: u32) -> Result<String> {
    let trimmed = amount.trim();
    let invalid = || AppError::InvalidNumericFormat(trimmed.to_string());

    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    if frac_part.len() > decimals as usize {
        return Err(invalid());
    }

    let scaled = format!(
        "{int_part}{frac_part:0<width$}",
        width = decimals as usize
    );
    // Normalizes leading zeros and guards against overflow past 2^256.
    let value = U256::from_dec_str(&scaled).map_err(|_| invalid())?;
    Ok(value.to_string())
}
