//! Closed set of caller-facing operations, dispatched through [`SolanaClient::execute`].

use log::{debug, log, Level};
use serde::{Deserialize, Serialize};
use solana_sdk::clock::{Slot, UnixTimestamp};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, TransactionStatus, UiConfirmedBlock};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorClass, Result};
use crate::models::{
    AccountSnapshot, Balance, BlockhashInfo, ClusterNode, EpochProgress, HealthStatus, KeyedAccount,
    NftMetadata, ParsedAccount, StakeAccount, StakeActivation, SupplyTotals, TokenAccount, TokenAmount,
    TokenBalance, TokenHolding, TransactionSummary, ValidatorSet, VersionInfo,
};
use crate::solana::rpc_helpers::MemcmpFilter;
use crate::solana::SolanaClient;

fn default_history_limit() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    // account
    GetBalance {
        address: String,
    },
    GetAccountInfo {
        address: String,
    },
    GetParsedAccountInfo {
        address: String,
    },
    GetTokenAccounts {
        owner: String,
    },
    GetTransactionHistory {
        address: String,
        #[serde(default = "default_history_limit")]
        limit: usize,
    },

    // transaction
    GetTransaction {
        signature: String,
    },
    GetSignatureStatus {
        signature: String,
    },
    GetLatestBlockhash,
    TransferSol {
        to: String,
        amount: f64,
    },
    RequestAirdrop {
        address: String,
        amount: f64,
    },

    // token
    GetTokenBalance {
        wallet: String,
        mint: String,
    },
    GetTokenSupply {
        mint: String,
    },
    GetLargestTokenAccounts {
        mint: String,
    },
    TransferToken {
        mint: String,
        to: String,
        amount: f64,
        #[serde(default)]
        decimals: Option<u8>,
    },
    CreateTokenAccount {
        mint: String,
        #[serde(default)]
        owner: Option<String>,
    },

    // program
    #[serde(rename_all = "camelCase")]
    GetProgramAccounts {
        program_id: String,
        #[serde(default)]
        filters: Vec<MemcmpFilter>,
        #[serde(default)]
        limit: Option<usize>,
    },

    // stake
    GetStakeAccounts {
        wallet: String,
    },
    #[serde(rename_all = "camelCase")]
    GetStakeActivation {
        stake_account: String,
    },
    GetValidators,
    GetEpochInfo,

    // nft
    GetNftMetadata {
        mint: String,
    },
    GetNftsByOwner {
        owner: String,
    },

    // network
    GetBlock {
        slot: Slot,
    },
    GetBlockHeight,
    GetSlot,
    GetBlockTime {
        slot: Slot,
    },
    GetClusterNodes,
    GetHealth,
    GetVersion,
    GetSupply,
}

impl Operation {
    /// Whether the operation submits a transaction or airdrop
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::TransferSol { .. }
                | Operation::RequestAirdrop { .. }
                | Operation::TransferToken { .. }
                | Operation::CreateTokenAccount { .. }
        )
    }
}

/// Result of an [`Operation`], serialized without a wrapper
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    Balance(Balance),
    Account(AccountSnapshot),
    ParsedAccount(ParsedAccount),
    TokenAccounts(Vec<TokenAccount>),
    History(Vec<TransactionSummary>),
    Transaction(Option<Box<EncodedConfirmedTransactionWithStatusMeta>>),
    SignatureStatus(Option<TransactionStatus>),
    Blockhash(BlockhashInfo),
    Submitted { signature: String },
    TokenBalance(TokenBalance),
    TokenAmount(TokenAmount),
    TokenHoldings(Vec<TokenHolding>),
    ProgramAccounts(Vec<KeyedAccount>),
    StakeAccounts(Vec<StakeAccount>),
    StakeActivation(StakeActivation),
    Validators(ValidatorSet),
    Epoch(EpochProgress),
    Nft(Option<NftMetadata>),
    Nfts(Vec<NftMetadata>),
    Block(Box<UiConfirmedBlock>),
    Height(u64),
    Slot(Slot),
    BlockTime(UnixTimestamp),
    ClusterNodes(Vec<ClusterNode>),
    Health(HealthStatus),
    Version(VersionInfo),
    Supply(SupplyTotals),
}

/// Caller mistakes stay at debug; only failures nobody can act on reach error
fn failure_level(err: &Error) -> Level {
    match err.class() {
        ErrorClass::Unknown | ErrorClass::Transient => Level::Error,
        ErrorClass::Expired | ErrorClass::RateLimited | ErrorClass::InsufficientFunds => Level::Warn,
        ErrorClass::InvalidInput | ErrorClass::Fatal => Level::Debug,
    }
}

impl SolanaClient {
    /// Run one operation. The client's shutdown also cancels it.
    pub async fn execute(&self, operation: Operation, cancel: &CancellationToken) -> Result<OperationOutput> {
        debug!("Executing {:?}", operation);
        let shutdown = self.shutdown_token();
        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Error::Cancelled),
            outcome = self.dispatch(operation, cancel) => outcome,
        };
        if let Err(e) = &outcome {
            log!(failure_level(e), "Operation failed: {}", e);
        }
        outcome
    }

    async fn dispatch(&self, operation: Operation, cancel: &CancellationToken) -> Result<OperationOutput> {
        let queries = self.queries();
        let transactions = self.transactions();

        Ok(match operation {
            Operation::GetBalance { address } => OperationOutput::Balance(queries.balance(&address).await?),
            Operation::GetAccountInfo { address } => {
                OperationOutput::Account(queries.account_info(&address).await?)
            }
            Operation::GetParsedAccountInfo { address } => {
                OperationOutput::ParsedAccount(queries.parsed_account_info(&address).await?)
            }
            Operation::GetTokenAccounts { owner } => {
                OperationOutput::TokenAccounts(queries.token_accounts(&owner).await?)
            }
            Operation::GetTransactionHistory { address, limit } => {
                OperationOutput::History(queries.transaction_history(&address, limit).await?)
            }
            Operation::GetTransaction { signature } => {
                OperationOutput::Transaction(queries.transaction(&signature).await?.map(Box::new))
            }
            Operation::GetSignatureStatus { signature } => {
                OperationOutput::SignatureStatus(queries.signature_status(&signature).await?)
            }
            Operation::GetLatestBlockhash => OperationOutput::Blockhash(queries.latest_blockhash().await?),
            Operation::TransferSol { to, amount } => OperationOutput::Submitted {
                signature: transactions.transfer_native(&to, amount, cancel).await?.to_string(),
            },
            Operation::RequestAirdrop { address, amount } => OperationOutput::Submitted {
                signature: transactions.request_airdrop(&address, amount, cancel).await?.to_string(),
            },
            Operation::GetTokenBalance { wallet, mint } => {
                OperationOutput::TokenBalance(queries.token_balance(&wallet, &mint).await?)
            }
            Operation::GetTokenSupply { mint } => OperationOutput::TokenAmount(queries.token_supply(&mint).await?),
            Operation::GetLargestTokenAccounts { mint } => {
                OperationOutput::TokenHoldings(queries.largest_token_accounts(&mint).await?)
            }
            Operation::TransferToken {
                mint,
                to,
                amount,
                decimals,
            } => OperationOutput::Submitted {
                signature: transactions
                    .transfer_token(&mint, &to, amount, decimals, cancel)
                    .await?
                    .to_string(),
            },
            Operation::CreateTokenAccount { mint, owner } => OperationOutput::Submitted {
                signature: transactions
                    .create_associated_account(&mint, owner.as_deref(), cancel)
                    .await?
                    .to_string(),
            },
            Operation::GetProgramAccounts {
                program_id,
                filters,
                limit,
            } => OperationOutput::ProgramAccounts(queries.program_accounts(&program_id, filters, limit).await?),
            Operation::GetStakeAccounts { wallet } => {
                OperationOutput::StakeAccounts(queries.stake_accounts(&wallet).await?)
            }
            Operation::GetStakeActivation { stake_account } => {
                OperationOutput::StakeActivation(queries.stake_activation(&stake_account).await?)
            }
            Operation::GetValidators => OperationOutput::Validators(queries.validators().await?),
            Operation::GetEpochInfo => OperationOutput::Epoch(queries.epoch_progress().await?),
            Operation::GetNftMetadata { mint } => OperationOutput::Nft(queries.nft_metadata(&mint).await?),
            Operation::GetNftsByOwner { owner } => OperationOutput::Nfts(queries.nfts_by_owner(&owner).await?),
            Operation::GetBlock { slot } => OperationOutput::Block(Box::new(queries.block(slot).await?)),
            Operation::GetBlockHeight => OperationOutput::Height(queries.block_height().await?),
            Operation::GetSlot => OperationOutput::Slot(queries.slot().await?),
            Operation::GetBlockTime { slot } => OperationOutput::BlockTime(queries.block_time(slot).await?),
            Operation::GetClusterNodes => OperationOutput::ClusterNodes(queries.cluster_nodes().await?),
            Operation::GetHealth => OperationOutput::Health(queries.health().await),
            Operation::GetVersion => OperationOutput::Version(queries.version().await?),
            Operation::GetSupply => OperationOutput::Supply(queries.supply().await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Network};

    #[test]
    fn test_operations_parse_from_tagged_json() {
        let op: Operation = serde_json::from_str(
            r#"{"operation":"getTransactionHistory","address":"11111111111111111111111111111111"}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::GetTransactionHistory {
                address: "11111111111111111111111111111111".to_string(),
                limit: 10,
            }
        );

        let op: Operation = serde_json::from_str(
            r#"{"operation":"getProgramAccounts","programId":"11111111111111111111111111111111","filters":[{"offset":0,"bytes":[1,2]}]}"#,
        )
        .unwrap();
        assert!(matches!(op, Operation::GetProgramAccounts { ref filters, .. } if filters.len() == 1));

        assert!(serde_json::from_str::<Operation>(r#"{"operation":"mintEverything"}"#).is_err());
    }

    #[test]
    fn test_write_operations() {
        assert!(Operation::TransferSol {
            to: String::new(),
            amount: 1.0
        }
        .is_write());
        assert!(!Operation::GetSlot.is_write());
    }

    #[tokio::test]
    async fn test_execute_surfaces_typed_errors() {
        let client = SolanaClient::new(&Credentials::new(Network::Mainnet)).unwrap();
        let cancel = CancellationToken::new();

        let airdrop = Operation::RequestAirdrop {
            address: "11111111111111111111111111111111".to_string(),
            amount: 1.0,
        };
        assert!(matches!(
            client.execute(airdrop, &cancel).await,
            Err(Error::UnsupportedOperation(_))
        ));

        let transfer = Operation::TransferSol {
            to: "11111111111111111111111111111111".to_string(),
            amount: 1.0,
        };
        assert!(matches!(client.execute(transfer, &cancel).await, Err(Error::Auth)));
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_is_cancelled() {
        let client = SolanaClient::new(&Credentials::custom("http://127.0.0.1:9")).unwrap();
        client.shutdown().await;
        let result = client
            .execute(Operation::GetSlot, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_failure_log_level_follows_error_class() {
        assert_eq!(failure_level(&Error::InvalidAddress("x".into())), Level::Debug);
        assert_eq!(failure_level(&Error::Auth), Level::Debug);
        assert_eq!(failure_level(&Error::Cancelled), Level::Debug);
        assert_eq!(failure_level(&Error::InsufficientFunds("short".into())), Level::Warn);
        assert_eq!(failure_level(&Error::RateLimited("429".into())), Level::Warn);
        assert_eq!(failure_level(&Error::Transient("timed out".into())), Level::Error);
        assert_eq!(failure_level(&Error::Unknown("odd".into())), Level::Error);
    }

    #[test]
    fn test_output_serializes_without_wrapper() {
        let output = OperationOutput::Submitted {
            signature: "abc".to_string(),
        };
        assert_eq!(serde_json::to_string(&output).unwrap(), r#"{"signature":"abc"}"#);
        assert_eq!(serde_json::to_string(&OperationOutput::Slot(5)).unwrap(), "5");
    }
}
