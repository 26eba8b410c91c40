use serde::{Deserialize, Serialize};
use solana_sdk::clock::{Epoch, Slot, UnixTimestamp};

/// Native balance of one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub address: String,
    pub lamports: u64,
    pub sol: f64,
}

/// Raw account state; `data` is base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub address: String,
    pub exists: bool,
    pub lamports: u64,
    pub sol: f64,
    pub owner: Option<String>,
    pub executable: bool,
    pub rent_epoch: Epoch,
    pub data: Option<String>,
}

/// Account state with program-aware decoded data when the node can parse it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAccount {
    pub address: String,
    pub exists: bool,
    pub lamports: u64,
    pub sol: f64,
    pub owner: Option<String>,
    pub executable: bool,
    pub rent_epoch: Epoch,
    pub data: serde_json::Value,
}

impl ParsedAccount {
    pub fn missing(address: &str) -> Self {
        Self {
            address: address.to_string(),
            exists: false,
            lamports: 0,
            sol: 0.0,
            owner: None,
            executable: false,
            rent_epoch: 0,
            data: serde_json::Value::Null,
        }
    }
}

/// An account owned by some program, as returned by program scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedAccount {
    pub address: String,
    pub lamports: u64,
    pub sol: f64,
    pub owner: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionOutcome {
    Success,
    Failed,
}

/// One entry of an address's transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub signature: String,
    pub slot: Slot,
    pub block_time: Option<UnixTimestamp>,
    pub fee: Option<u64>,
    pub status: TransactionOutcome,
    pub error: Option<String>,
}

/// Blockhash usable for a new transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockhashInfo {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}
