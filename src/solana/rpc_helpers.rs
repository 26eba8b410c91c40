use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_account_decoder::{UiAccount, UiAccountEncoding};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::{Response, RpcKeyedAccount};
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::error::Result;

/// Maximum keys accepted by a single `getMultipleAccounts` call
const MULTIPLE_ACCOUNTS_CHUNK: usize = 100;

/// A byte-comparison filter for program account scans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl MemcmpFilter {
    pub fn new(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    /// Match a 32-byte address at `offset`
    pub fn address(offset: usize, address: &Pubkey) -> Self {
        Self::new(offset, address.to_bytes().to_vec())
    }

    fn into_rpc(self) -> RpcFilterType {
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(self.offset, self.bytes))
    }
}

/// Make a direct raw JSON RPC request to the Solana node
pub async fn make_raw_rpc_request<T: DeserializeOwned>(
    rpc_client: &RpcClient,
    request: RpcRequest,
    params: serde_json::Value,
) -> Result<T> {
    debug!("Raw RPC request {}", request);
    let response = rpc_client.send(request, params).await?;
    Ok(response)
}

/// Fetch one account with `jsonParsed` encoding
pub async fn get_parsed_account(
    rpc_client: &RpcClient,
    address: &Pubkey,
    commitment: CommitmentConfig,
) -> Result<Option<UiAccount>> {
    let config = RpcAccountInfoConfig {
        encoding: Some(UiAccountEncoding::JsonParsed),
        commitment: Some(commitment),
        ..RpcAccountInfoConfig::default()
    };
    let response: Response<Option<UiAccount>> = make_raw_rpc_request(
        rpc_client,
        RpcRequest::GetAccountInfo,
        json!([address.to_string(), config]),
    )
    .await?;
    Ok(response.value)
}

/// Find program accounts matching every filter, decoded with `jsonParsed`
pub async fn find_program_accounts_by_data(
    rpc_client: &RpcClient,
    program_id: &Pubkey,
    filters: Vec<MemcmpFilter>,
    commitment: CommitmentConfig,
) -> Result<Vec<RpcKeyedAccount>> {
    let config = RpcProgramAccountsConfig {
        filters: if filters.is_empty() {
            None
        } else {
            Some(filters.into_iter().map(MemcmpFilter::into_rpc).collect())
        },
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::JsonParsed),
            data_slice: None,
            commitment: Some(commitment),
            min_context_slot: None,
        },
        ..RpcProgramAccountsConfig::default()
    };

    let accounts: Vec<RpcKeyedAccount> = make_raw_rpc_request(
        rpc_client,
        RpcRequest::GetProgramAccounts,
        json!([program_id.to_string(), config]),
    )
    .await?;
    debug!("Found {} accounts for program {}", accounts.len(), program_id);

    Ok(accounts)
}

/// Calculate the program-derived address (PDA)
pub fn find_pda(seeds: &[&[u8]], program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(seeds, program_id)
}

/// Get multiple accounts, chunked to the RPC limit, logging missing ones
pub async fn get_multiple_accounts_with_handling(
    rpc_client: &RpcClient,
    pubkeys: &[Pubkey],
) -> Result<Vec<Option<Account>>> {
    let mut accounts = Vec::with_capacity(pubkeys.len());
    for chunk in pubkeys.chunks(MULTIPLE_ACCOUNTS_CHUNK) {
        accounts.extend(rpc_client.get_multiple_accounts(chunk).await?);
    }

    for (pubkey, account) in pubkeys.iter().zip(accounts.iter()) {
        if account.is_none() {
            warn!("Account not found: {}", pubkey);
        }
    }

    Ok(accounts)
}

/// JSON value of an account's data, whatever encoding the node picked
pub fn account_data_value(account: &UiAccount) -> serde_json::Value {
    serde_json::to_value(&account.data).unwrap_or(serde_json::Value::Null)
}
