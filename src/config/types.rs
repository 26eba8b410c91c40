use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::env;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::solana::RetryConfig;

/// Solana cluster to connect to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[serde(rename = "mainnet-beta", alias = "mainnet")]
    Mainnet,
    Testnet,
    #[default]
    Devnet,
    Custom,
}

impl Network {
    /// The production cluster, where faucets do not exist
    pub fn is_production(&self) -> bool {
        matches!(self, Network::Mainnet)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet-beta",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Custom => "custom",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" => Ok(Network::Devnet),
            "custom" => Ok(Network::Custom),
            other => Err(Error::Config(format!("unknown network: {}", other))),
        }
    }
}

/// How finalized queried or confirmed state must be
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

impl FromStr for Commitment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(Error::Config(format!("unknown commitment level: {}", other))),
        }
    }
}

/// Network and signing configuration supplied by the caller
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub network: Network,
    /// Required when `network` is `Custom`
    #[serde(default)]
    pub custom_rpc_url: Option<String>,
    /// Base58 string or JSON byte array; only needed for write operations
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub commitment: Commitment,
    /// Overrides the derived WebSocket endpoint
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl Credentials {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn custom(rpc_url: impl Into<String>) -> Self {
        Self {
            network: Network::Custom,
            custom_rpc_url: Some(rpc_url.into()),
            ..Default::default()
        }
    }

    pub fn with_private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network", &self.network)
            .field("custom_rpc_url", &self.custom_rpc_url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("commitment", &self.commitment)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

/// Tuning knobs that are not part of the credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Retry policy for state-changing calls
    pub retry: RetryConfig,
    /// Per-request RPC timeout
    pub request_timeout: Duration,
    /// Upper bound on confirmation waits that have no blockhash deadline (airdrops)
    pub confirm_timeout: Duration,
    /// Assumed slot time for epoch estimates
    pub slot_duration: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(60),
            slot_duration: Duration::from_millis(400),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}

/// Loads credentials from environment variables, falling back to devnet defaults.
///
/// `SOLANA_KEYPAIR_PATH` names a keypair file and is only read when
/// `SOLANA_PRIVATE_KEY` is unset.
pub fn load_credentials() -> Result<Credentials> {
    let mut credentials = Credentials::default();

    if let Some(network) = non_empty_var("SOLANA_NETWORK") {
        credentials.network = network.parse()?;
    }

    credentials.custom_rpc_url = non_empty_var("SOLANA_RPC_URL");
    credentials.ws_url = non_empty_var("SOLANA_WS_URL");
    credentials.private_key = match non_empty_var("SOLANA_PRIVATE_KEY") {
        Some(key) => Some(key),
        None => non_empty_var("SOLANA_KEYPAIR_PATH")
            .map(|path| {
                fs::read_to_string(&path)
                    .map(|contents| contents.trim().to_string())
                    .map_err(|e| Error::Config(format!("Failed to read keypair file at {}: {}", path, e)))
            })
            .transpose()?,
    };

    if let Some(commitment) = non_empty_var("SOLANA_COMMITMENT") {
        credentials.commitment = commitment.parse()?;
    }

    Ok(credentials)
}

/// Loads client options from environment variables, falling back to default values
pub fn load_options() -> Result<ClientOptions> {
    let mut options = ClientOptions::default();

    if let Some(slot_ms) = parse_var::<u64>("SOLANA_SLOT_MS")? {
        options.slot_duration = Duration::from_millis(slot_ms);
    }

    if let Some(attempts) = parse_var::<u32>("SOLANA_MAX_ATTEMPTS")? {
        options.retry.max_attempts = attempts;
    }

    if let Some(base_ms) = parse_var::<u64>("SOLANA_RETRY_BASE_MS")? {
        options.retry.base_delay_ms = base_ms;
    }

    if let Some(timeout) = parse_var::<u64>("SOLANA_TIMEOUT_SECS")? {
        options.request_timeout = Duration::from_secs(timeout);
    }

    Ok(options)
}
