mod convert;
mod format;

pub use convert::decode_key_bytes;
pub use convert::lamports_to_sol;
pub use convert::parse_base_units;
pub use convert::sol_to_lamports;
pub use convert::to_base_units;
pub use convert::to_display_amount;
pub use convert::{LAMPORTS_PER_SOL, MAX_DECIMALS, NATIVE_DECIMALS};
pub use format::format_pubkey;
pub use format::shorten;
