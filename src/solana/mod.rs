pub mod address;
pub mod client;
pub mod connection;
pub mod metadata;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod rpc_helpers;
pub mod transaction;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{parse_address, parse_optional_address};
pub use client::SolanaClient;
pub use connection::{Connection, ConnectionManager};
pub use metadata::MetadataService;
pub use query::{parse_signature, QueryService};
pub use resolver::{ConnectionConfig, CredentialResolver};
pub use retry::{cancel_after, RetryConfig, RetryPolicy};
pub use rpc_helpers::MemcmpFilter;
pub use transaction::{associated_token_address, token_transfer_instructions, TransactionService};
pub use wallet::{sign_transaction, SigningKey, TransactionSigner};

use crate::config::{load_credentials, load_options};
use crate::error::Result;

/// Create a Solana client from the environment configuration
pub fn create_client_from_env() -> Result<SolanaClient> {
    let credentials = load_credentials()?;
    let options = load_options()?;
    SolanaClient::with_options(&credentials, options)
}
