use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{Commitment, Credentials, Network};
use crate::error::{Error, Result};

/// Canonical RPC and WebSocket endpoints of the built-in clusters
const ENDPOINTS: [(Network, &str, &str); 3] = [
    (
        Network::Mainnet,
        "https://api.mainnet-beta.solana.com",
        "wss://api.mainnet-beta.solana.com",
    ),
    (
        Network::Testnet,
        "https://api.testnet.solana.com",
        "wss://api.testnet.solana.com",
    ),
    (
        Network::Devnet,
        "https://api.devnet.solana.com",
        "wss://api.devnet.solana.com",
    ),
];

/// Fully resolved connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub network: Network,
    pub rpc_endpoint: String,
    pub ws_endpoint: String,
    pub commitment: Commitment,
}

fn builtin_endpoints(network: Network) -> Option<(&'static str, &'static str)> {
    ENDPOINTS
        .iter()
        .find(|(candidate, _, _)| *candidate == network)
        .map(|(_, rpc, ws)| (*rpc, *ws))
}

fn validate_url(value: &str, schemes: &[&str], field: &str) -> Result<()> {
    let parsed = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL ({}): {}", field, e, value)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(Error::Config(format!(
            "{} must use one of {:?}, got {}",
            field,
            schemes,
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("{} has no host: {}", field, value)));
    }
    Ok(())
}

/// Rewrite an HTTP(S) endpoint into its WebSocket counterpart
fn derive_ws_endpoint(rpc_endpoint: &str) -> String {
    if let Some(rest) = rpc_endpoint.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_endpoint.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_endpoint.to_string()
    }
}

/// Turns caller credentials into a `ConnectionConfig`. Pure, no I/O.
pub struct CredentialResolver;

impl CredentialResolver {
    pub fn resolve(credentials: &Credentials) -> Result<ConnectionConfig> {
        let ws_override = credentials
            .ws_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        if let Some(ws_url) = ws_override {
            validate_url(ws_url, &["ws", "wss"], "WebSocket URL")?;
        }

        let (rpc_endpoint, ws_default) = match credentials.network {
            Network::Custom => {
                let rpc = credentials
                    .custom_rpc_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| {
                        Error::Config(
                            "Custom RPC URL is required when using custom network".to_string(),
                        )
                    })?;
                validate_url(rpc, &["http", "https"], "Custom RPC URL")?;
                (rpc.to_string(), derive_ws_endpoint(rpc))
            }
            network => {
                let (rpc, ws) = builtin_endpoints(network).ok_or_else(|| {
                    Error::Config(format!("no built-in endpoint for {}", network))
                })?;
                (rpc.to_string(), ws.to_string())
            }
        };

        Ok(ConnectionConfig {
            network: credentials.network,
            rpc_endpoint,
            ws_endpoint: ws_override.map(str::to_string).unwrap_or(ws_default),
            commitment: credentials.commitment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_networks() {
        let config = CredentialResolver::resolve(&Credentials::new(Network::Mainnet)).unwrap();
        assert_eq!(config.rpc_endpoint, "https://api.mainnet-beta.solana.com");
        assert_eq!(config.ws_endpoint, "wss://api.mainnet-beta.solana.com");

        let config = CredentialResolver::resolve(&Credentials::new(Network::Devnet)).unwrap();
        assert_eq!(config.rpc_endpoint, "https://api.devnet.solana.com");
        assert_eq!(config.ws_endpoint, "wss://api.devnet.solana.com");
        assert_eq!(config.commitment, Commitment::Confirmed);
    }

    #[test]
    fn test_custom_requires_url() {
        let mut credentials = Credentials::new(Network::Custom);
        assert!(matches!(
            CredentialResolver::resolve(&credentials),
            Err(Error::Config(_))
        ));

        credentials.custom_rpc_url = Some(String::new());
        assert!(matches!(
            CredentialResolver::resolve(&credentials),
            Err(Error::Config(_))
        ));

        credentials.custom_rpc_url = Some("not a url".to_string());
        assert!(matches!(
            CredentialResolver::resolve(&credentials),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_custom_url_is_kept_verbatim() {
        let config =
            CredentialResolver::resolve(&Credentials::custom("https://rpc.example.com/key/abc"))
                .unwrap();
        assert_eq!(config.rpc_endpoint, "https://rpc.example.com/key/abc");
        assert_eq!(config.ws_endpoint, "wss://rpc.example.com/key/abc");

        let config = CredentialResolver::resolve(&Credentials::custom("http://127.0.0.1:8899")).unwrap();
        assert_eq!(config.ws_endpoint, "ws://127.0.0.1:8899");
    }

    #[test]
    fn test_ws_override() {
        let credentials = Credentials::custom("https://rpc.example.com")
            .with_ws_url("wss://stream.example.com");
        let config = CredentialResolver::resolve(&credentials).unwrap();
        assert_eq!(config.ws_endpoint, "wss://stream.example.com");

        let credentials = Credentials::new(Network::Testnet).with_ws_url("https://wrong.example.com");
        assert!(matches!(
            CredentialResolver::resolve(&credentials),
            Err(Error::Config(_))
        ));
    }
}
