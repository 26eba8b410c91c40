use crate::error::{Error, Result};

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
/// Decimal exponent of the native asset
pub const NATIVE_DECIMALS: u8 = 9;
/// Largest exponent whose scale factor fits in a u64
pub const MAX_DECIMALS: u8 = 19;

const KEYPAIR_LENGTH: usize = 64;

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    to_display_amount(lamports, NATIVE_DECIMALS)
}

/// Convert SOL to lamports, rounding toward zero
pub fn sol_to_lamports(sol: f64) -> Result<u64> {
    to_base_units(sol, NATIVE_DECIMALS)
}

/// Convert a display amount to integer base units, rounding toward zero.
///
/// The conversion goes through the shortest decimal representation of the
/// float, so `0.29` becomes exactly `290_000_000` at 9 decimals.
pub fn to_base_units(display_amount: f64, decimals: u8) -> Result<u64> {
    if !display_amount.is_finite() || display_amount < 0.0 {
        return Err(Error::InvalidInput(format!(
            "amount must be a non-negative number, got {}",
            display_amount
        )));
    }
    parse_base_units(&display_amount.to_string(), decimals)
}

/// Convert a decimal string to integer base units, truncating extra digits
pub fn parse_base_units(amount: &str, decimals: u8) -> Result<u64> {
    if decimals > MAX_DECIMALS {
        return Err(Error::InvalidInput(format!("unsupported decimals: {}", decimals)));
    }
    let invalid = || Error::InvalidInput(format!("invalid amount: {}", amount));

    let amount = amount.trim();
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let scale = 10u64.pow(decimals as u32);
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .ok()
            .and_then(|w| w.checked_mul(scale))
            .ok_or_else(invalid)?
    };

    let kept: String = fraction.chars().take(decimals as usize).collect();
    let fraction_units = if kept.is_empty() {
        0
    } else {
        let padding = decimals as u32 - kept.len() as u32;
        kept.parse::<u64>().map_err(|_| invalid())? * 10u64.pow(padding)
    };

    whole_units.checked_add(fraction_units).ok_or_else(invalid)
}

/// Convert integer base units to a display amount
pub fn to_display_amount(base_units: u64, decimals: u8) -> f64 {
    base_units as f64 / 10f64.powi(decimals as i32)
}

/// Decode a 64-byte secret key given as base58 or as a JSON byte array
pub fn decode_key_bytes(input: &str) -> Result<[u8; KEYPAIR_LENGTH]> {
    let input = input.trim();

    if let Ok(bytes) = bs58::decode(input).into_vec() {
        if let Ok(array) = <[u8; KEYPAIR_LENGTH]>::try_from(bytes.as_slice()) {
            return Ok(array);
        }
    }

    if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(input) {
        if let Ok(array) = <[u8; KEYPAIR_LENGTH]>::try_from(bytes.as_slice()) {
            return Ok(array);
        }
    }

    Err(Error::InvalidKey)
}
