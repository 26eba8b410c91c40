mod types;

pub use types::load_credentials;
pub use types::load_options;
pub use types::{ClientOptions, Commitment, Credentials, Network};
