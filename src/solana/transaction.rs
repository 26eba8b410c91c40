use log::{debug, info, warn};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use spl_associated_token_account::instruction::create_associated_token_account;
use solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorClass, Result};
use crate::solana::address::{parse_address, parse_optional_address};
use crate::solana::connection::Connection;
use crate::solana::retry::RetryPolicy;
use crate::solana::wallet::{sign_transaction, TransactionSigner};
use crate::utils::{format_pubkey, shorten, sol_to_lamports, to_base_units};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Associated token account of `owner` for `mint`
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}

/// Instructions for a token transfer from `payer`'s associated account.
///
/// When `create_recipient_account` is set the recipient's associated account
/// is created first, inside the same transaction.
pub fn token_transfer_instructions(
    payer: &Pubkey,
    mint: &Pubkey,
    recipient: &Pubkey,
    base_units: u64,
    decimals: u8,
    create_recipient_account: bool,
) -> Result<Vec<Instruction>> {
    let source = associated_token_address(payer, mint);
    let destination = associated_token_address(recipient, mint);

    let mut instructions = Vec::with_capacity(2);
    if create_recipient_account {
        instructions.push(create_associated_token_account(
            payer,
            recipient,
            mint,
            &spl_token::id(),
        ));
    }
    instructions.push(
        spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &source,
            mint,
            &destination,
            payer,
            &[],
            base_units,
            decimals,
        )
        .map_err(|e| Error::InvalidInput(format!("cannot build token transfer: {}", e)))?,
    );
    Ok(instructions)
}

/// Builds, signs, submits and confirms state-changing transactions
pub struct TransactionService {
    connection: Connection,
    signer: Option<Arc<dyn TransactionSigner>>,
    retry: RetryPolicy,
    confirm_timeout: Duration,
}

impl TransactionService {
    pub fn new(
        connection: Connection,
        signer: Option<Arc<dyn TransactionSigner>>,
        retry: RetryPolicy,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            signer,
            retry,
            confirm_timeout,
        }
    }

    /// The configured signer, or `Error::Auth` when there is none
    pub fn signer(&self) -> Result<&dyn TransactionSigner> {
        self.signer.as_deref().ok_or(Error::Auth)
    }

    /// Send SOL from the signer to `to`
    pub async fn transfer_native(&self, to: &str, amount_sol: f64, cancel: &CancellationToken) -> Result<Signature> {
        let signer = self.signer()?;
        let recipient = parse_address(to)?;
        let lamports = sol_to_lamports(amount_sol)?;

        let instructions = [system_instruction::transfer(
            &signer.public_address(),
            &recipient,
            lamports,
        )];
        let instructions = &instructions[..];

        let signature = self
            .retry
            .execute("transfer_native", cancel, move || self.submit(signer, instructions))
            .await?;

        info!(
            "Transferred {} lamports to {} ({})",
            lamports,
            format_pubkey(&recipient),
            shorten(&signature.to_string())
        );
        Ok(signature)
    }

    /// Send SPL tokens, creating the recipient's associated account in the same transaction if needed
    pub async fn transfer_token(
        &self,
        mint: &str,
        to: &str,
        amount: f64,
        decimals: Option<u8>,
        cancel: &CancellationToken,
    ) -> Result<Signature> {
        let signer = self.signer()?;
        let mint = parse_address(mint)?;
        let recipient = parse_address(to)?;

        let decimals = match decimals {
            Some(decimals) => decimals,
            None => self.mint_decimals(&mint).await?,
        };
        let base_units = to_base_units(amount, decimals)?;
        let payer = signer.public_address();
        let destination = associated_token_address(&recipient, &mint);

        let signature = self
            .retry
            .execute("transfer_token", cancel, move || async move {
                let create = !self.account_exists(&destination).await?;
                if create {
                    debug!("Recipient account {} missing, creating it in the same transaction", destination);
                }
                let instructions =
                    token_transfer_instructions(&payer, &mint, &recipient, base_units, decimals, create)?;
                self.submit(signer, &instructions).await
            })
            .await?;

        info!(
            "Transferred {} base units of {} to {} ({})",
            base_units,
            format_pubkey(&mint),
            format_pubkey(&recipient),
            shorten(&signature.to_string())
        );
        Ok(signature)
    }

    /// Create the associated token account of `owner` (default: the signer).
    ///
    /// Not idempotent: an existing account surfaces the chain's error.
    pub async fn create_associated_account(
        &self,
        mint: &str,
        owner: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Signature> {
        let signer = self.signer()?;
        let mint = parse_address(mint)?;
        let payer = signer.public_address();
        let owner = parse_optional_address(owner)?.unwrap_or(payer);

        let instructions = [create_associated_token_account(
            &payer,
            &owner,
            &mint,
            &spl_token::id(),
        )];
        let instructions = &instructions[..];

        let signature = self
            .retry
            .execute("create_associated_account", cancel, move || {
                self.submit(signer, instructions)
            })
            .await?;

        info!(
            "Created token account {} for {}",
            associated_token_address(&owner, &mint),
            format_pubkey(&owner)
        );
        Ok(signature)
    }

    /// Request test-network SOL from the faucet and wait for it to confirm
    pub async fn request_airdrop(&self, address: &str, amount_sol: f64, cancel: &CancellationToken) -> Result<Signature> {
        if self.connection.network().is_production() {
            return Err(Error::UnsupportedOperation(
                "Airdrop is not available on mainnet".to_string(),
            ));
        }
        let pubkey = parse_address(address)?;
        let lamports = sol_to_lamports(amount_sol)?;

        let signature = self
            .retry
            .execute("request_airdrop", cancel, move || async move {
                let signature = self
                    .connection
                    .rpc_client()
                    .request_airdrop(&pubkey, lamports)
                    .await?;
                self.await_confirmation(&signature, None).await?;
                Ok::<_, Error>(signature)
            })
            .await?;

        info!("Received airdrop of {} lamports on {}", lamports, format_pubkey(&pubkey));
        Ok(signature)
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let account = self
            .connection
            .rpc_client()
            .get_account_with_commitment(mint, self.connection.commitment())
            .await?
            .value
            .ok_or_else(|| Error::InvalidInput(format!("mint account not found: {}", mint)))?;
        let state = Mint::unpack(&account.data)
            .map_err(|e| Error::InvalidInput(format!("{} is not a token mint: {}", mint, e)))?;
        Ok(state.decimals)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        Ok(self
            .connection
            .rpc_client()
            .get_account_with_commitment(address, self.connection.commitment())
            .await?
            .value
            .is_some())
    }

    /// Sign with a fresh blockhash, send, and wait for the configured commitment
    async fn submit(&self, signer: &dyn TransactionSigner, instructions: &[Instruction]) -> Result<Signature> {
        let rpc = self.connection.rpc_client();
        let (blockhash, last_valid_block_height) = rpc
            .get_latest_blockhash_with_commitment(self.connection.commitment())
            .await?;

        let transaction = sign_transaction(signer, instructions, blockhash)?;
        let signature = transaction.signatures[0];

        if let Err(err) = rpc.send_transaction(&transaction).await {
            let err = Error::from(err);
            if err.class() != ErrorClass::Transient {
                return Err(err);
            }
            // The node may still have forwarded it; only a blockhash expiry proves it did not land.
            warn!("Send of {} failed ({}), waiting to see if it landed", shorten(&signature.to_string()), err);
        } else {
            debug!("Submitted transaction {}", shorten(&signature.to_string()));
        }

        self.await_confirmation(&signature, Some(last_valid_block_height)).await?;
        Ok(signature)
    }

    /// Poll until the signature reaches the configured commitment.
    ///
    /// With a known `last_valid_block_height` the wait ends in `Expired` once
    /// the blockhash can no longer land; otherwise `confirm_timeout` applies.
    async fn await_confirmation(&self, signature: &Signature, last_valid_block_height: Option<u64>) -> Result<()> {
        let rpc = self.connection.rpc_client();
        let commitment = self.connection.commitment();
        let started = Instant::now();

        loop {
            if let Some(status) = rpc.get_signature_status_with_commitment(signature, commitment).await? {
                debug!("Transaction {} reached {:?}", shorten(&signature.to_string()), commitment.commitment);
                return status.map_err(Error::from_transaction_error);
            }

            match last_valid_block_height {
                Some(last_valid) => {
                    let height = rpc.get_block_height_with_commitment(commitment).await?;
                    if height > last_valid {
                        if let Some(status) = rpc.get_signature_status_with_commitment(signature, commitment).await? {
                            return status.map_err(Error::from_transaction_error);
                        }
                        return Err(Error::Expired(format!(
                            "block height exceeded: {} was not confirmed before height {}",
                            signature, last_valid
                        )));
                    }
                }
                None if started.elapsed() >= self.confirm_timeout => {
                    return Err(Error::Transient(format!(
                        "timed out after {:?} waiting for {} to confirm",
                        self.confirm_timeout, signature
                    )));
                }
                None => {}
            }

            time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientOptions, Credentials, Network};
    use crate::solana::connection::ConnectionManager;
    use crate::solana::resolver::CredentialResolver;
    use crate::solana::retry::RetryConfig;
    use crate::solana::testing::{with_context, Reply, Script};
    use crate::solana::wallet::SigningKey;
    use serde_json::{json, Value};
    use solana_client::nonblocking::rpc_client::RpcClient;
    use solana_client::rpc_request::RpcRequest;
    use solana_sdk::hash::Hash;
    use solana_sdk::signer::keypair::Keypair;
    use solana_sdk::transaction::{self, TransactionError};
    use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus};

    fn service(credentials: Credentials, signer: Option<Arc<dyn TransactionSigner>>) -> TransactionService {
        let config = CredentialResolver::resolve(&credentials).unwrap();
        let options = ClientOptions {
            request_timeout: Duration::from_millis(200),
            ..ClientOptions::default()
        };
        TransactionService::new(
            ConnectionManager::open(config, &options),
            signer,
            single_attempt(),
            Duration::from_secs(1),
        )
    }

    fn signer() -> Arc<dyn TransactionSigner> {
        Arc::new(SigningKey::from_keypair(Keypair::new()))
    }

    fn single_attempt() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
        })
    }

    /// Service backed by solana-client's built-in mock node
    fn mock_service(behaviour: &str) -> TransactionService {
        let config = CredentialResolver::resolve(&Credentials::new(Network::Devnet)).unwrap();
        let connection = ConnectionManager::open_with_client(config, RpcClient::new_mock(behaviour.to_string()));
        TransactionService::new(connection, Some(signer()), single_attempt(), Duration::from_secs(5))
    }

    fn scripted_service(script: &Arc<Script>, retry: RetryPolicy) -> TransactionService {
        TransactionService::new(script.devnet(), Some(signer()), retry, Duration::from_secs(5))
    }

    fn blockhash(last_valid_block_height: u64) -> Value {
        with_context(json!({
            "blockhash": Hash::new_unique().to_string(),
            "lastValidBlockHeight": last_valid_block_height,
        }))
    }

    fn not_found() -> Value {
        with_context(json!([null]))
    }

    fn landed(status: transaction::Result<()>) -> Value {
        let err = status.clone().err();
        let status = TransactionStatus {
            slot: 5,
            confirmations: None,
            status,
            err,
            confirmation_status: Some(TransactionConfirmationStatus::Finalized),
        };
        with_context(serde_json::to_value(vec![Some(status)]).unwrap())
    }

    fn recipient() -> String {
        Pubkey::new_unique().to_string()
    }

    #[tokio::test]
    async fn test_transfer_returns_once_node_confirms() {
        let service = mock_service("succeeds");
        let token = CancellationToken::new();
        assert!(service.transfer_native(&recipient(), 0.25, &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_on_chain_status_is_surfaced() {
        let service = mock_service("instruction_error");
        let token = CancellationToken::new();
        match service.transfer_native(&recipient(), 0.25, &token).await {
            Err(Error::Unknown(message)) => assert!(message.contains("Instruction 0"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_chain_failure_is_classified() {
        let script = Script::new();
        script
            .value(RpcRequest::GetLatestBlockhash, blockhash(100))
            .reply(RpcRequest::SendTransaction, Reply::Io("connection reset by peer"))
            .value(RpcRequest::GetSignatureStatuses, landed(Err(TransactionError::InsufficientFundsForFee)));
        let service = scripted_service(&script, single_attempt());

        let result = service
            .transfer_native(&recipient(), 0.25, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_still_waits_for_the_transaction() {
        let script = Script::new();
        script
            .value(RpcRequest::GetLatestBlockhash, blockhash(100))
            .reply(RpcRequest::SendTransaction, Reply::Io("connection reset by peer"))
            .value(RpcRequest::GetSignatureStatuses, not_found())
            .value(RpcRequest::GetSignatureStatuses, landed(Ok(())))
            .value(RpcRequest::GetBlockHeight, json!(99));
        let service = scripted_service(&script, single_attempt());

        let result = service
            .transfer_native(&recipient(), 0.25, &CancellationToken::new())
            .await;
        assert!(result.is_ok());
        assert_eq!(script.count(RpcRequest::SendTransaction), 1);
        assert_eq!(script.count(RpcRequest::GetSignatureStatuses), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_once_block_height_passes() {
        let script = Script::new();
        script
            .value(RpcRequest::GetLatestBlockhash, blockhash(100))
            .reply(RpcRequest::SendTransaction, Reply::Io("connection reset by peer"))
            .value(RpcRequest::GetSignatureStatuses, not_found())
            .value(RpcRequest::GetBlockHeight, json!(99))
            .value(RpcRequest::GetBlockHeight, json!(100))
            .value(RpcRequest::GetBlockHeight, json!(101));
        let service = scripted_service(&script, single_attempt());

        let result = service
            .transfer_native(&recipient(), 0.25, &CancellationToken::new())
            .await;
        match result {
            Err(Error::Expired(message)) => assert!(message.contains("block height exceeded")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(script.count(RpcRequest::SendTransaction), 1);
        assert_eq!(script.count(RpcRequest::GetBlockHeight), 3);
        // three polls plus the final re-check
        assert_eq!(script.count(RpcRequest::GetSignatureStatuses), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_attempt_is_resigned_with_fresh_blockhash() {
        let script = Script::new();
        script
            .value(RpcRequest::GetLatestBlockhash, blockhash(100))
            .reply(RpcRequest::SendTransaction, Reply::Io("connection reset by peer"))
            .value(RpcRequest::GetSignatureStatuses, not_found())
            .value(RpcRequest::GetBlockHeight, json!(101));
        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            base_delay_ms: 10,
        });
        let service = scripted_service(&script, retry);

        let result = service
            .transfer_native(&recipient(), 0.25, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Expired(_))));
        assert_eq!(script.count(RpcRequest::GetLatestBlockhash), 2);
        assert_eq!(script.count(RpcRequest::SendTransaction), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_airdrop_confirmation_times_out() {
        let script = Script::new();
        script
            .value(RpcRequest::RequestAirdrop, json!(Signature::new_unique().to_string()))
            .value(RpcRequest::GetSignatureStatuses, not_found());
        let service = scripted_service(&script, single_attempt());

        let result = service
            .request_airdrop(&recipient(), 1.0, &CancellationToken::new())
            .await;
        match result {
            Err(Error::Transient(message)) => assert!(message.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
        // no blockhash deadline, so block height is never consulted
        assert_eq!(script.count(RpcRequest::GetBlockHeight), 0);
        assert_eq!(script.count(RpcRequest::GetSignatureStatuses), 11);
    }

    #[test]
    fn test_transfer_to_new_recipient_is_one_atomic_transaction() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();

        let instructions = token_transfer_instructions(&payer, &mint, &recipient, 1_500_000, 6, true).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id, spl_associated_token_account::id());
        assert_eq!(instructions[1].program_id, spl_token::id());
        assert_eq!(instructions[0].accounts[1].pubkey, associated_token_address(&recipient, &mint));
        assert_eq!(instructions[1].accounts[2].pubkey, associated_token_address(&recipient, &mint));

        let key = SigningKey::from_keypair(Keypair::new());
        let payer = key.public_address();
        let instructions = token_transfer_instructions(&payer, &mint, &recipient, 10, 0, true).unwrap();
        let transaction =
            sign_transaction(&key, &instructions, solana_sdk::hash::Hash::new_unique()).unwrap();
        assert_eq!(transaction.message.instructions.len(), 2);
    }

    #[test]
    fn test_transfer_to_existing_recipient_skips_creation() {
        let instructions = token_transfer_instructions(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            1,
            0,
            false,
        )
        .unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].program_id, spl_token::id());
    }

    #[tokio::test]
    async fn test_airdrop_refused_on_mainnet_without_network() {
        let service = service(Credentials::new(Network::Mainnet), None);
        let token = CancellationToken::new();
        let result = service
            .request_airdrop("So11111111111111111111111111111111111111112", 1.0, &token)
            .await;
        assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn test_writes_require_signing_key() {
        let service = service(Credentials::custom("http://127.0.0.1:9"), None);
        let token = CancellationToken::new();
        let recipient = Pubkey::new_unique().to_string();

        assert!(matches!(service.transfer_native(&recipient, 1.0, &token).await, Err(Error::Auth)));
        assert!(matches!(
            service.transfer_token(&recipient, &recipient, 1.0, Some(6), &token).await,
            Err(Error::Auth)
        ));
        assert!(matches!(
            service.create_associated_account(&recipient, None, &token).await,
            Err(Error::Auth)
        ));
    }

    #[tokio::test]
    async fn test_bad_input_rejected_before_submission() {
        let service = service(Credentials::custom("http://127.0.0.1:9"), Some(signer()));
        let token = CancellationToken::new();

        assert!(matches!(
            service.transfer_native("invalid", 1.0, &token).await,
            Err(Error::InvalidAddress(_))
        ));
        assert!(matches!(
            service
                .transfer_native(&Pubkey::new_unique().to_string(), -2.0, &token)
                .await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_submission() {
        let service = service(Credentials::custom("http://127.0.0.1:9"), Some(signer()));
        let token = CancellationToken::new();
        token.cancel();

        let result = service
            .transfer_native(&Pubkey::new_unique().to_string(), 0.1, &token)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
