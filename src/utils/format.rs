use solana_sdk::pubkey::Pubkey;

/// Format a pubkey for display (shortened)
pub fn format_pubkey(pubkey: &Pubkey) -> String {
    shorten(&pubkey.to_string())
}

/// Shorten any base58 identifier (address or signature) for log lines
pub fn shorten(value: &str) -> String {
    let len = value.len();
    if len <= 8 {
        return value.to_string();
    }
    format!("{}...{}", &value[0..4], &value[len - 4..len])
}
