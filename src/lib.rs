pub mod config;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod operation;
pub mod solana;
pub mod utils;

pub use config::{ClientOptions, Commitment, Credentials, Network};
pub use error::{Error, ErrorClass, Result};
pub use operation::{Operation, OperationOutput};
pub use solana::SolanaClient;
