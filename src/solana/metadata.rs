use borsh::BorshDeserialize;
use log::{debug, warn};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{NftCreator, NftMetadata, TokenAccount};
use crate::solana::address::parse_address;
use crate::solana::rpc_helpers::{find_pda, get_multiple_accounts_with_handling};

/// Token metadata program
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Account discriminator of a v1 metadata account
const METADATA_V1_KEY: u8 = 4;

#[derive(BorshDeserialize)]
struct CreatorRecord {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

#[derive(BorshDeserialize)]
struct MetadataData {
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<CreatorRecord>>,
}

/// Leading fields of a metadata account; trailing fields are ignored
#[derive(BorshDeserialize)]
struct MetadataRecord {
    key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    data: MetadataData,
    primary_sale_happened: bool,
    is_mutable: bool,
}

fn trim_padding(value: String) -> String {
    value.trim_end_matches('\0').to_string()
}

/// Derive the metadata account address of a mint
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    find_pda(
        &[b"metadata", TOKEN_METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

/// Decode raw metadata account data
pub fn decode_metadata(metadata_address: &Pubkey, data: &[u8]) -> Result<NftMetadata> {
    let record = MetadataRecord::deserialize(&mut &data[..])
        .map_err(|e| Error::InvalidInput(format!("not a metadata account {}: {}", metadata_address, e)))?;
    if record.key != METADATA_V1_KEY {
        return Err(Error::InvalidInput(format!(
            "account {} has metadata key {}, expected {}",
            metadata_address, record.key, METADATA_V1_KEY
        )));
    }

    let creators = record
        .data
        .creators
        .unwrap_or_default()
        .into_iter()
        .map(|creator| NftCreator {
            address: Pubkey::new_from_array(creator.address).to_string(),
            verified: creator.verified,
            share: creator.share,
        })
        .collect();

    Ok(NftMetadata {
        mint: Pubkey::new_from_array(record.mint).to_string(),
        metadata_address: metadata_address.to_string(),
        update_authority: Pubkey::new_from_array(record.update_authority).to_string(),
        name: trim_padding(record.data.name),
        symbol: trim_padding(record.data.symbol),
        uri: trim_padding(record.data.uri),
        seller_fee_basis_points: record.data.seller_fee_basis_points,
        primary_sale_happened: record.primary_sale_happened,
        is_mutable: record.is_mutable,
        creators,
    })
}

/// Reads NFT metadata through the connection's RPC client
pub struct MetadataService {
    rpc_client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl MetadataService {
    pub(crate) fn new(rpc_client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        Self {
            rpc_client,
            commitment,
        }
    }

    /// Metadata of a single mint, `None` if it has no metadata account
    pub async fn find_by_mint(&self, mint: &str) -> Result<Option<NftMetadata>> {
        let mint = parse_address(mint)?;
        let address = metadata_address(&mint);
        debug!("Fetching metadata account {} for mint {}", address, mint);

        let account = self
            .rpc_client
            .get_account_with_commitment(&address, self.commitment)
            .await?
            .value;

        account
            .map(|account| decode_metadata(&address, &account.data))
            .transpose()
    }

    /// Metadata for every single-unit token the owner holds
    pub async fn find_all_by_owner(&self, owner: &str) -> Result<Vec<NftMetadata>> {
        let owner = parse_address(owner)?;
        let keyed = self
            .rpc_client
            .get_token_accounts_by_owner(&owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await?;

        let mints: Vec<Pubkey> = keyed
            .iter()
            .filter_map(TokenAccount::from_keyed)
            .filter(TokenAccount::is_single_unit)
            .filter_map(|account| parse_address(&account.mint).ok())
            .collect();
        debug!("Owner {} holds {} single-unit tokens", owner, mints.len());

        let addresses: Vec<Pubkey> = mints.iter().map(metadata_address).collect();
        let accounts = get_multiple_accounts_with_handling(&self.rpc_client, &addresses).await?;
        Ok(decode_found(&addresses, accounts))
    }
}

/// Decode fetched metadata accounts; missing or unreadable ones are skipped
fn decode_found(addresses: &[Pubkey], accounts: Vec<Option<Account>>) -> Vec<NftMetadata> {
    addresses
        .iter()
        .zip(accounts)
        .filter_map(|(address, account)| {
            let account = account?;
            match decode_metadata(address, &account.data) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Skipping metadata account {}: {}", address, e);
                    None
                }
            }
        })
        .collect()
}
