use log::{debug, info};
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, Once};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientOptions, Credentials, Network};
use crate::error::{Error, Result};
use crate::monitoring::SubscriptionManager;
use crate::solana::connection::{Connection, ConnectionManager};
use crate::solana::query::QueryService;
use crate::solana::resolver::CredentialResolver;
use crate::solana::retry::RetryPolicy;
use crate::solana::transaction::TransactionService;
use crate::solana::wallet::{SigningKey, TransactionSigner};

static STARTUP_NOTICE: Once = Once::new();

fn announce() {
    STARTUP_NOTICE.call_once(|| {
        info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    });
}

/// One configured Solana client: a connection plus the services built on it
pub struct SolanaClient {
    connection: Connection,
    signer: Option<Arc<dyn TransactionSigner>>,
    queries: QueryService,
    transactions: TransactionService,
}

impl SolanaClient {
    /// Create a client with default options. No network traffic happens here.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_options(credentials, ClientOptions::default())
    }

    pub fn with_options(credentials: &Credentials, options: ClientOptions) -> Result<Self> {
        let signer = match credentials.private_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                Some(Arc::new(SigningKey::decode(key)?) as Arc<dyn TransactionSigner>)
            }
            _ => None,
        };
        Self::build(credentials, options, signer)
    }

    /// Create a client that signs with an external signer instead of a private key
    pub fn with_signer(
        credentials: &Credentials,
        options: ClientOptions,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self> {
        Self::build(credentials, options, Some(signer))
    }

    fn build(
        credentials: &Credentials,
        options: ClientOptions,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> Result<Self> {
        announce();
        let config = CredentialResolver::resolve(credentials)?;
        let connection = ConnectionManager::open(config, &options);

        if let Some(signer) = &signer {
            debug!("Signing as {}", signer.public_address());
        }

        Ok(Self {
            queries: QueryService::new(connection.clone(), options.slot_duration),
            transactions: TransactionService::new(
                connection.clone(),
                signer.clone(),
                RetryPolicy::new(options.retry.clone()),
                options.confirm_timeout,
            ),
            connection,
            signer,
        })
    }

    pub fn network(&self) -> Network {
        self.connection.network()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The signer, or `Error::Auth` for a read-only client
    pub fn signer(&self) -> Result<&dyn TransactionSigner> {
        self.signer.as_deref().ok_or(Error::Auth)
    }

    pub fn public_address(&self) -> Result<Pubkey> {
        Ok(self.signer()?.public_address())
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn transactions(&self) -> &TransactionService {
        &self.transactions
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        self.connection.subscriptions()
    }

    /// Token cancelled by `shutdown`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.connection.shutdown_token()
    }

    /// Cancel every subscription and in-flight `execute` call, then close the connection
    pub async fn shutdown(&self) {
        if self.connection.is_closed() {
            return;
        }
        info!("Shutting down client for {}", self.connection.config().rpc_endpoint);
        ConnectionManager::close(self.connection.clone()).await;
    }
}
