mod account;
mod chain;
mod stake;
mod token;

pub use account::{
    AccountSnapshot, Balance, BlockhashInfo, KeyedAccount, ParsedAccount, TransactionOutcome,
    TransactionSummary,
};
pub use chain::{ClusterNode, EpochProgress, HealthStatus, SupplyTotals, Validator, ValidatorSet, VersionInfo};
pub use stake::{ActivationState, StakeAccount, StakeActivation};
pub use token::{NftCreator, NftMetadata, TokenAccount, TokenAmount, TokenBalance, TokenHolding};
