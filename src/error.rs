use regex::{Regex, RegexBuilder};
use reqwest::StatusCode;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::pubsub_client::PubsubClientError;
use solana_sdk::transaction::TransactionError;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors surfaced by the client
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid Solana address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key format. Expected base58 encoded string or JSON array of bytes.")]
    InvalidKey,

    /// The operation needs a signing key and none was configured
    #[error("Private key is required for this operation")]
    Auth,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Input rejected either locally or by the chain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient funds for this transaction: {0}")]
    InsufficientFunds(String),

    /// Stale blockhash; the transaction must be rebuilt
    #[error("Transaction expired: {0}")]
    Expired(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    /// Anything the classifier does not recognise, message preserved verbatim
    #[error("{0}")]
    Unknown(String),

    #[error("Malformed response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure for retry purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Expired,
    InsufficientFunds,
    InvalidInput,
    RateLimited,
    Transient,
    Unknown,
    /// Local failures that never reached the network (config, auth, cancellation)
    Fatal,
}

impl ErrorClass {
    /// Whether a failure of this class may be attempted again.
    ///
    /// `Unknown` is retryable, but `RetryPolicy` grants it a single retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::Expired | ErrorClass::RateLimited | ErrorClass::Transient | ErrorClass::Unknown
        )
    }
}

impl Error {
    /// Build the error variant matching a classification, keeping the message
    pub fn from_class(class: ErrorClass, message: impl Into<String>) -> Self {
        let message = message.into();
        match class {
            ErrorClass::Expired => Error::Expired(message),
            ErrorClass::InsufficientFunds => Error::InsufficientFunds(message),
            ErrorClass::InvalidInput => Error::InvalidInput(message),
            ErrorClass::RateLimited => Error::RateLimited(message),
            ErrorClass::Transient => Error::Transient(message),
            ErrorClass::Unknown | ErrorClass::Fatal => Error::Unknown(message),
        }
    }

    /// Classify an already-typed error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_)
            | Error::Auth
            | Error::UnsupportedOperation(_)
            | Error::Cancelled => ErrorClass::Fatal,
            Error::InvalidAddress(_) | Error::InvalidKey | Error::InvalidInput(_) => {
                ErrorClass::InvalidInput
            }
            Error::InsufficientFunds(_) => ErrorClass::InsufficientFunds,
            Error::Expired(_) => ErrorClass::Expired,
            Error::RateLimited(_) => ErrorClass::RateLimited,
            Error::Transient(_) => ErrorClass::Transient,
            Error::Unknown(_) | Error::Serialization(_) => ErrorClass::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Convert an on-chain transaction failure
    pub fn from_transaction_error(err: TransactionError) -> Self {
        let class = match err {
            TransactionError::BlockhashNotFound => ErrorClass::Expired,
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => ErrorClass::InsufficientFunds,
            ref other => classify_message(&other.to_string()),
        };
        Error::from_class(class, err.to_string())
    }
}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        let class = classify(&err);
        Error::from_class(class, err.to_string())
    }
}

impl From<PubsubClientError> for Error {
    fn from(err: PubsubClientError) -> Self {
        let message = err.to_string();
        let class = match err {
            PubsubClientError::UrlParseError(_) => ErrorClass::InvalidInput,
            PubsubClientError::ConnectionError(_) | PubsubClientError::ConnectionClosed(_) => {
                ErrorClass::Transient
            }
            _ => classify_message(&message),
        };
        Error::from_class(class, message)
    }
}

/// Ordered pattern table; the first matching row wins.
const PATTERNS: &[(ErrorClass, &str)] = &[
    (
        ErrorClass::Expired,
        r"blockhash not found|block height exceeded|transaction expired|blockhash.*expired",
    ),
    (
        ErrorClass::InsufficientFunds,
        r"insufficient (funds|lamports)|no record of a prior credit|custom program error: 0x1\b",
    ),
    (
        ErrorClass::InvalidInput,
        r"invalid (public key|address|param|signature|account|instruction|solana address)|already in use|-32602|wrong ?size",
    ),
    (ErrorClass::RateLimited, r"\b429\b|too many requests|rate.?limit"),
    (
        ErrorClass::Transient,
        r"timed? ?out|connection (refused|reset|closed|aborted)|error sending request|\b50[234]\b|service unavailable|node is (behind|unhealthy)|temporarily unavailable|broken pipe|unexpected eof",
    ),
];

fn pattern_table() -> &'static [(ErrorClass, Regex)] {
    static TABLE: OnceLock<Vec<(ErrorClass, Regex)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(class, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|re| (*class, re))
            })
            .collect()
    })
}

/// Classify a raw failure message against the pattern table
pub fn classify_message(message: &str) -> ErrorClass {
    pattern_table()
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(class, _)| *class)
        .unwrap_or(ErrorClass::Unknown)
}

/// Classify a raw RPC client failure.
///
/// Typed error kinds are checked first, the message table second.
pub fn classify(err: &ClientError) -> ErrorClass {
    match err.kind() {
        ClientErrorKind::TransactionError(TransactionError::BlockhashNotFound) => ErrorClass::Expired,
        ClientErrorKind::TransactionError(
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. },
        ) => ErrorClass::InsufficientFunds,
        ClientErrorKind::Reqwest(e) if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) => {
            ErrorClass::RateLimited
        }
        ClientErrorKind::Reqwest(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
        ClientErrorKind::Io(_) => ErrorClass::Transient,
        _ => classify_message(&err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message_table() {
        assert_eq!(classify_message("Blockhash not found"), ErrorClass::Expired);
        assert_eq!(
            classify_message("Transaction simulation failed: Attempt to debit an account but found no record of a prior credit."),
            ErrorClass::InsufficientFunds
        );
        assert_eq!(
            classify_message("Error processing Instruction 0: custom program error: 0x1"),
            ErrorClass::InsufficientFunds
        );
        assert_eq!(
            classify_message("Error processing Instruction 0: custom program error: 0x10"),
            ErrorClass::Unknown
        );
        assert_eq!(classify_message("HTTP status client error (429 Too Many Requests)"), ErrorClass::RateLimited);
        assert_eq!(classify_message("error sending request for url"), ErrorClass::Transient);
        assert_eq!(classify_message("operation timed out"), ErrorClass::Transient);
        assert_eq!(classify_message("Invalid param: WrongSize"), ErrorClass::InvalidInput);
        assert_eq!(classify_message("something odd happened"), ErrorClass::Unknown);
    }

    #[test]
    fn test_transaction_error_conversion() {
        assert!(matches!(
            Error::from_transaction_error(TransactionError::BlockhashNotFound),
            Error::Expired(_)
        ));
        assert!(matches!(
            Error::from_transaction_error(TransactionError::InsufficientFundsForFee),
            Error::InsufficientFunds(_)
        ));
    }

    #[test]
    fn test_client_error_keeps_message() {
        let err = ClientError::from(ClientErrorKind::Custom("validator said no".to_string()));
        let converted = Error::from(err);
        assert!(matches!(converted, Error::Unknown(_)));
        assert!(converted.to_string().contains("validator said no"));
    }

    #[test]
    fn test_retryability() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(ErrorClass::Expired.is_retryable());
        assert!(!ErrorClass::InsufficientFunds.is_retryable());
        assert!(!ErrorClass::InvalidInput.is_retryable());
        assert!(!Error::Auth.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
