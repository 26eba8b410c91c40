use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use log::debug;
use serde_json::json;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcBlockConfig, RpcTransactionConfig};
use solana_client::rpc_request::{RpcRequest, TokenAccountsFilter};
use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::clock::{Slot, UnixTimestamp};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::stake;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, TransactionDetails, TransactionStatus,
    UiConfirmedBlock, UiTransactionEncoding,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    AccountSnapshot, Balance, BlockhashInfo, ClusterNode, EpochProgress, HealthStatus, KeyedAccount,
    NftMetadata, ParsedAccount, StakeAccount, StakeActivation, SupplyTotals, TokenAccount, TokenAmount,
    TokenBalance, TokenHolding, TransactionOutcome, TransactionSummary, ValidatorSet, VersionInfo,
};
use crate::solana::address::parse_address;
use crate::solana::connection::Connection;
use crate::solana::rpc_helpers::{
    account_data_value, find_program_accounts_by_data, get_parsed_account, make_raw_rpc_request,
    MemcmpFilter,
};
use crate::solana::transaction::associated_token_address;
use crate::utils::lamports_to_sol;

/// Most signatures one `getSignaturesForAddress` call returns; larger limits are paged
pub const SIGNATURE_PAGE_LIMIT: usize = 1_000;

/// Offset of the staker authority inside a stake account
const STAKE_AUTHORITY_OFFSET: usize = 12;

/// Parse a base58 transaction signature
pub fn parse_signature(signature: &str) -> Result<Signature> {
    Signature::from_str(signature)
        .map_err(|_| Error::InvalidInput(format!("invalid signature: {}", signature)))
}

/// Read-only chain queries. None of these are retried internally.
#[derive(Clone)]
pub struct QueryService {
    connection: Connection,
    slot_duration: Duration,
}

impl QueryService {
    pub fn new(connection: Connection, slot_duration: Duration) -> Self {
        Self {
            connection,
            slot_duration,
        }
    }

    /// Commitment for history methods, which the RPC refuses below `confirmed`
    fn history_commitment(&self) -> CommitmentConfig {
        let commitment = self.connection.commitment();
        if commitment.is_at_least_confirmed() {
            commitment
        } else {
            CommitmentConfig::confirmed()
        }
    }

    fn transaction_config(&self) -> RpcTransactionConfig {
        RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.history_commitment()),
            max_supported_transaction_version: Some(0),
        }
    }

    fn block_config(&self) -> RpcBlockConfig {
        RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Json),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(true),
            commitment: Some(self.history_commitment()),
            max_supported_transaction_version: Some(0),
        }
    }

    pub async fn balance(&self, address: &str) -> Result<Balance> {
        let pubkey = parse_address(address)?;
        debug!("Getting balance of {}", pubkey);
        let lamports = self.connection.rpc_client().get_balance(&pubkey).await?;
        Ok(Balance {
            address: address.to_string(),
            lamports,
            sol: lamports_to_sol(lamports),
        })
    }

    /// Raw account state with base64 data
    pub async fn account_info(&self, address: &str) -> Result<AccountSnapshot> {
        let pubkey = parse_address(address)?;
        let account = self
            .connection
            .rpc_client()
            .get_account_with_commitment(&pubkey, self.connection.commitment())
            .await?
            .value;

        Ok(match account {
            Some(account) => AccountSnapshot {
                address: address.to_string(),
                exists: true,
                lamports: account.lamports,
                sol: lamports_to_sol(account.lamports),
                owner: Some(account.owner.to_string()),
                executable: account.executable,
                rent_epoch: account.rent_epoch,
                data: Some(BASE64_STANDARD.encode(&account.data)),
            },
            None => AccountSnapshot {
                address: address.to_string(),
                exists: false,
                lamports: 0,
                sol: 0.0,
                owner: None,
                executable: false,
                rent_epoch: 0,
                data: None,
            },
        })
    }

    /// Account state with program-aware decoding
    pub async fn parsed_account_info(&self, address: &str) -> Result<ParsedAccount> {
        let pubkey = parse_address(address)?;
        let account =
            get_parsed_account(self.connection.rpc_client(), &pubkey, self.connection.commitment())
                .await?;

        Ok(match account {
            Some(account) => ParsedAccount {
                address: address.to_string(),
                exists: true,
                lamports: account.lamports,
                sol: lamports_to_sol(account.lamports),
                owner: Some(account.owner.clone()),
                executable: account.executable,
                rent_epoch: account.rent_epoch,
                data: account_data_value(&account),
            },
            None => ParsedAccount::missing(address),
        })
    }

    pub async fn token_accounts(&self, owner: &str) -> Result<Vec<TokenAccount>> {
        let owner = parse_address(owner)?;
        let keyed = self
            .connection
            .rpc_client()
            .get_token_accounts_by_owner(&owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await?;
        Ok(keyed.iter().filter_map(TokenAccount::from_keyed).collect())
    }

    /// Most recent transactions first, at most `limit` of them
    pub async fn transaction_history(&self, address: &str, limit: usize) -> Result<Vec<TransactionSummary>> {
        let pubkey = parse_address(address)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let signatures = self.signatures(&pubkey, limit).await?;
        debug!("Fetched {} signatures for {}", signatures.len(), pubkey);

        let mut history = Vec::with_capacity(signatures.len());
        for entry in signatures {
            if let Some(transaction) = self.transaction(&entry.signature).await? {
                history.push(summarize(&entry.signature, &transaction));
            }
        }
        Ok(history)
    }

    /// Newest `limit` signatures for `address`, paging backwards with `before`
    async fn signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let rpc = self.connection.rpc_client();
        let mut collected: Vec<RpcConfirmedTransactionStatusWithSignature> = Vec::new();
        let mut before = None;

        while collected.len() < limit {
            let requested = (limit - collected.len()).min(SIGNATURE_PAGE_LIMIT);
            let config = GetConfirmedSignaturesForAddress2Config {
                before,
                until: None,
                limit: Some(requested),
                commitment: Some(self.history_commitment()),
            };
            let page = rpc.get_signatures_for_address_with_config(address, config).await?;
            let exhausted = page.len() < requested;
            before = match page.last() {
                Some(entry) => Some(parse_signature(&entry.signature)?),
                None => None,
            };
            collected.extend(page);
            if exhausted {
                break;
            }
        }
        Ok(collected)
    }

    /// Full transaction by signature; `None` if the node does not know it
    pub async fn transaction(&self, signature: &str) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        let signature = parse_signature(signature)?;
        make_raw_rpc_request(
            self.connection.rpc_client(),
            RpcRequest::GetTransaction,
            json!([signature.to_string(), self.transaction_config()]),
        )
        .await
    }

    pub async fn signature_status(&self, signature: &str) -> Result<Option<TransactionStatus>> {
        let signature = parse_signature(signature)?;
        let mut statuses = self
            .connection
            .rpc_client()
            .get_signature_statuses(&[signature])
            .await?
            .value;
        Ok(statuses.pop().flatten())
    }

    pub async fn latest_blockhash(&self) -> Result<BlockhashInfo> {
        let (blockhash, last_valid_block_height) = self
            .connection
            .rpc_client()
            .get_latest_blockhash_with_commitment(self.connection.commitment())
            .await?;
        Ok(BlockhashInfo {
            blockhash: blockhash.to_string(),
            last_valid_block_height,
        })
    }

    /// Balance of the wallet's associated account; zero when it does not exist yet
    pub async fn token_balance(&self, wallet: &str, mint: &str) -> Result<TokenBalance> {
        let owner = parse_address(wallet)?;
        let mint_key = parse_address(mint)?;
        let ata = associated_token_address(&owner, &mint_key);
        let rpc = self.connection.rpc_client();

        let exists = rpc
            .get_account_with_commitment(&ata, self.connection.commitment())
            .await?
            .value
            .is_some();
        let amount = if exists {
            TokenAmount::from(rpc.get_token_account_balance(&ata).await?)
        } else {
            TokenAmount::zero(0)
        };

        Ok(TokenBalance {
            address: ata.to_string(),
            mint: mint.to_string(),
            owner: wallet.to_string(),
            exists,
            amount,
        })
    }

    pub async fn token_supply(&self, mint: &str) -> Result<TokenAmount> {
        let mint = parse_address(mint)?;
        let supply = self.connection.rpc_client().get_token_supply(&mint).await?;
        Ok(supply.into())
    }

    pub async fn largest_token_accounts(&self, mint: &str) -> Result<Vec<TokenHolding>> {
        let mint = parse_address(mint)?;
        let accounts = self.connection.rpc_client().get_token_largest_accounts(&mint).await?;
        Ok(accounts.into_iter().map(TokenHolding::from).collect())
    }

    /// Accounts owned by `program_id`, optionally narrowed by byte filters
    pub async fn program_accounts(
        &self,
        program_id: &str,
        filters: Vec<MemcmpFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<KeyedAccount>> {
        let program = parse_address(program_id)?;
        let accounts = find_program_accounts_by_data(
            self.connection.rpc_client(),
            &program,
            filters,
            self.connection.commitment(),
        )
        .await?;

        Ok(accounts
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|keyed| KeyedAccount {
                data: account_data_value(&keyed.account),
                lamports: keyed.account.lamports,
                sol: lamports_to_sol(keyed.account.lamports),
                owner: keyed.account.owner,
                address: keyed.pubkey,
            })
            .collect())
    }

    /// Stake accounts whose staker authority is `wallet`
    pub async fn stake_accounts(&self, wallet: &str) -> Result<Vec<StakeAccount>> {
        let wallet = parse_address(wallet)?;
        let accounts = find_program_accounts_by_data(
            self.connection.rpc_client(),
            &stake::program::id(),
            vec![MemcmpFilter::address(STAKE_AUTHORITY_OFFSET, &wallet)],
            self.connection.commitment(),
        )
        .await?;

        Ok(accounts
            .into_iter()
            .map(|keyed| StakeAccount {
                data: account_data_value(&keyed.account),
                lamports: keyed.account.lamports,
                sol: lamports_to_sol(keyed.account.lamports),
                address: keyed.pubkey,
            })
            .collect())
    }

    #[allow(deprecated)]
    pub async fn stake_activation(&self, stake_address: &str) -> Result<StakeActivation> {
        let pubkey = parse_address(stake_address)?;
        let activation = self.connection.rpc_client().get_stake_activation(pubkey, None).await?;
        Ok(StakeActivation::new(stake_address, activation))
    }

    pub async fn validators(&self) -> Result<ValidatorSet> {
        let status = self.connection.rpc_client().get_vote_accounts().await?;
        let current: Vec<_> = status.current.into_iter().map(Into::into).collect();
        let delinquent: Vec<_> = status.delinquent.into_iter().map(Into::into).collect();
        Ok(ValidatorSet {
            current_count: current.len(),
            delinquent_count: delinquent.len(),
            current,
            delinquent,
        })
    }

    pub async fn epoch_progress(&self) -> Result<EpochProgress> {
        let info = self.connection.rpc_client().get_epoch_info().await?;
        Ok(EpochProgress::from_epoch_info(&info, self.slot_duration))
    }

    pub async fn block(&self, slot: Slot) -> Result<UiConfirmedBlock> {
        Ok(self
            .connection
            .rpc_client()
            .get_block_with_config(slot, self.block_config())
            .await?)
    }

    pub async fn block_height(&self) -> Result<u64> {
        Ok(self.connection.rpc_client().get_block_height().await?)
    }

    pub async fn slot(&self) -> Result<Slot> {
        debug!("Getting current slot");
        Ok(self.connection.rpc_client().get_slot().await?)
    }

    pub async fn block_time(&self, slot: Slot) -> Result<UnixTimestamp> {
        Ok(self.connection.rpc_client().get_block_time(slot).await?)
    }

    pub async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>> {
        let nodes = self.connection.rpc_client().get_cluster_nodes().await?;
        Ok(nodes.into_iter().map(ClusterNode::from).collect())
    }

    /// Probe the endpoint with a cheap call. Never fails; errors become the status text.
    pub async fn health(&self) -> HealthStatus {
        match self.connection.rpc_client().get_slot().await {
            Ok(_) => HealthStatus::ok(),
            Err(e) => HealthStatus::failed(e.to_string()),
        }
    }

    pub async fn version(&self) -> Result<VersionInfo> {
        Ok(self.connection.rpc_client().get_version().await?.into())
    }

    pub async fn supply(&self) -> Result<SupplyTotals> {
        let supply = self.connection.rpc_client().supply().await?.value;
        Ok(supply.into())
    }

    pub async fn nft_metadata(&self, mint: &str) -> Result<Option<NftMetadata>> {
        self.connection.metadata().find_by_mint(mint).await
    }

    pub async fn nfts_by_owner(&self, owner: &str) -> Result<Vec<NftMetadata>> {
        self.connection.metadata().find_all_by_owner(owner).await
    }

    /// Associated token account of `owner` for `mint`
    pub fn associated_account(&self, owner: &str, mint: &str) -> Result<Pubkey> {
        Ok(associated_token_address(&parse_address(owner)?, &parse_address(mint)?))
    }
}

fn summarize(signature: &str, transaction: &EncodedConfirmedTransactionWithStatusMeta) -> TransactionSummary {
    let meta = transaction.transaction.meta.as_ref();
    let error = meta.and_then(|meta| meta.err.as_ref()).map(ToString::to_string);
    TransactionSummary {
        signature: signature.to_string(),
        slot: transaction.slot,
        block_time: transaction.block_time,
        fee: meta.map(|meta| meta.fee),
        status: if error.is_some() {
            TransactionOutcome::Failed
        } else {
            TransactionOutcome::Success
        },
        error,
    }
}
