use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Parse a user-supplied address.
///
/// Every address string accepted by the client goes through here before it
/// is used in a request.
pub fn parse_address(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|_| Error::InvalidAddress(address.to_string()))
}

/// Parse an address only when one was supplied
pub fn parse_optional_address(address: Option<&str>) -> Result<Option<Pubkey>> {
    address
        .filter(|value| !value.trim().is_empty())
        .map(parse_address)
        .transpose()
}
