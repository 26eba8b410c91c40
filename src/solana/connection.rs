use log::{debug, info};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientOptions, Network};
use crate::monitoring::SubscriptionManager;
use crate::solana::metadata::MetadataService;
use crate::solana::resolver::ConnectionConfig;

struct ConnectionInner {
    config: ConnectionConfig,
    rpc_client: Arc<RpcClient>,
    metadata: OnceLock<MetadataService>,
    subscriptions: SubscriptionManager,
    shutdown: CancellationToken,
}

/// Long-lived handle to one RPC endpoint, shared by the services of one client
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn network(&self) -> Network {
        self.inner.config.network
    }

    pub fn rpc_client(&self) -> &RpcClient {
        &self.inner.rpc_client
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.inner.config.commitment.into()
    }

    pub fn ws_endpoint(&self) -> &str {
        &self.inner.config.ws_endpoint
    }

    /// Subscriptions over this endpoint's websocket, opened on first subscribe
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// Cancelled once the connection is closed
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Metadata service, created on first use
    pub fn metadata(&self) -> &MetadataService {
        self.inner.metadata.get_or_init(|| {
            debug!("Creating metadata service for {}", self.inner.config.rpc_endpoint);
            MetadataService::new(self.inner.rpc_client.clone(), self.commitment())
        })
    }
}

/// Opens and closes connections. Opening never touches the network.
pub struct ConnectionManager;

impl ConnectionManager {
    pub fn open(config: ConnectionConfig, options: &ClientOptions) -> Connection {
        let rpc_client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_endpoint.clone(),
            options.request_timeout,
            config.commitment.into(),
        );
        Self::open_with_client(config, rpc_client)
    }

    /// Open over an already built RPC client, e.g. one with a custom `RpcSender`
    pub fn open_with_client(config: ConnectionConfig, rpc_client: RpcClient) -> Connection {
        info!(
            "Configured Solana RPC connection to {} ({}, {:?})",
            config.rpc_endpoint, config.network, config.commitment
        );
        let shutdown = CancellationToken::new();
        let subscriptions = SubscriptionManager::new(&config.ws_endpoint, config.commitment, shutdown.clone());

        Connection {
            inner: Arc::new(ConnectionInner {
                config,
                rpc_client: Arc::new(rpc_client),
                metadata: OnceLock::new(),
                subscriptions,
                shutdown,
            }),
        }
    }

    /// Close the websocket channel and cancel its subscriptions.
    ///
    /// This affects every clone of the connection. The HTTP pool is freed
    /// once the last clone is dropped.
    pub async fn close(connection: Connection) {
        let endpoint = connection.inner.config.rpc_endpoint.clone();
        connection.inner.subscriptions.shutdown().await;
        let remaining = Arc::strong_count(&connection.inner) - 1;
        drop(connection);
        debug!("Closed Solana connection to {} ({} handles left)", endpoint, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Commitment, Credentials};
    use crate::error::Error;
    use crate::monitoring::{SubscriptionRequest, SubscriptionState};
    use crate::solana::resolver::CredentialResolver;

    #[tokio::test]
    async fn test_open_is_offline_and_lazy() {
        let config = CredentialResolver::resolve(&Credentials::custom("http://127.0.0.1:1")).unwrap();
        let connection = ConnectionManager::open(config, &ClientOptions::default());

        assert_eq!(connection.rpc_client().url(), "http://127.0.0.1:1");
        assert_eq!(connection.ws_endpoint(), "ws://127.0.0.1:1");
        assert_eq!(connection.commitment(), CommitmentConfig::confirmed());
        assert_eq!(connection.subscriptions().active_count(), 0);

        let first = connection.metadata() as *const MetadataService;
        let second = connection.clone().metadata() as *const MetadataService;
        assert_eq!(first, second);

        ConnectionManager::close(connection).await;
    }

    #[tokio::test]
    async fn test_close_tears_down_subscriptions_for_every_handle() {
        let config = CredentialResolver::resolve(&Credentials::custom("http://127.0.0.1:1")).unwrap();
        let connection = ConnectionManager::open(config, &ClientOptions::default());
        let other = connection.clone();
        let (subscription, _dispatcher) = other
            .subscriptions()
            .attach(&SubscriptionRequest::SlotChange, Commitment::Confirmed);

        ConnectionManager::close(connection).await;

        assert!(other.is_closed());
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
        assert!(matches!(
            other.subscriptions().subscribe(SubscriptionRequest::SlotChange, None).await,
            Err(Error::Cancelled)
        ));
    }
}
