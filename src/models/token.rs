use serde::{Deserialize, Serialize};
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_account_decoder::UiAccountData;
use solana_client::rpc_response::{RpcKeyedAccount, RpcTokenAccountBalance};

/// Token quantity in base units plus its display form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    /// Base units, as a decimal string to keep full u64 precision
    pub amount: String,
    pub decimals: u8,
    pub ui_amount: f64,
}

impl TokenAmount {
    pub fn zero(decimals: u8) -> Self {
        Self {
            amount: "0".to_string(),
            decimals,
            ui_amount: 0.0,
        }
    }

    /// Amount in base units, when it fits in a u64
    pub fn base_units(&self) -> Option<u64> {
        self.amount.parse().ok()
    }
}

impl From<UiTokenAmount> for TokenAmount {
    fn from(amount: UiTokenAmount) -> Self {
        let ui_amount = amount
            .ui_amount
            .or_else(|| amount.ui_amount_string.parse().ok())
            .unwrap_or_default();
        Self {
            amount: amount.amount,
            decimals: amount.decimals,
            ui_amount,
        }
    }
}

/// A token account held by some owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    pub address: String,
    pub mint: String,
    pub owner: String,
    pub amount: TokenAmount,
    /// Parsed account data as returned by the node
    pub data: serde_json::Value,
}

impl TokenAccount {
    /// Read a `jsonParsed` token account; `None` if the node could not parse it
    pub fn from_keyed(keyed: &RpcKeyedAccount) -> Option<Self> {
        let UiAccountData::Json(parsed) = &keyed.account.data else {
            return None;
        };
        let info = parsed.parsed.get("info")?;
        let token_amount = info.get("tokenAmount")?;

        let amount = TokenAmount {
            amount: token_amount.get("amount")?.as_str()?.to_string(),
            decimals: u8::try_from(token_amount.get("decimals")?.as_u64()?).ok()?,
            ui_amount: token_amount
                .get("uiAmountString")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        };

        Some(Self {
            address: keyed.pubkey.clone(),
            mint: info.get("mint")?.as_str()?.to_string(),
            owner: info.get("owner")?.as_str()?.to_string(),
            amount,
            data: parsed.parsed.clone(),
        })
    }

    /// One indivisible unit, the shape of an NFT holding
    pub fn is_single_unit(&self) -> bool {
        self.amount.decimals == 0 && self.amount.amount == "1"
    }
}

/// Balance of one wallet for one mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Associated token account address
    pub address: String,
    pub mint: String,
    pub owner: String,
    pub exists: bool,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    pub address: String,
    pub amount: TokenAmount,
}

impl From<RpcTokenAccountBalance> for TokenHolding {
    fn from(balance: RpcTokenAccountBalance) -> Self {
        Self {
            address: balance.address,
            amount: balance.amount.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftCreator {
    pub address: String,
    pub verified: bool,
    pub share: u8,
}

/// Decoded token-metadata account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMetadata {
    pub mint: String,
    pub metadata_address: String,
    pub update_authority: String,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub primary_sale_happened: bool,
    pub is_mutable: bool,
    pub creators: Vec<NftCreator>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_account_decoder::parse_account_data::ParsedAccount;
    use solana_account_decoder::UiAccount;
    use serde_json::json;

    fn keyed(parsed: serde_json::Value) -> RpcKeyedAccount {
        RpcKeyedAccount {
            pubkey: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            account: UiAccount {
                lamports: 2_039_280,
                data: UiAccountData::Json(ParsedAccount {
                    program: "spl-token".to_string(),
                    parsed,
                    space: 165,
                }),
                owner: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string(),
                executable: false,
                rent_epoch: 0,
                space: Some(165),
            },
        }
    }

    #[test]
    fn test_token_account_from_parsed_data() {
        let account = TokenAccount::from_keyed(&keyed(json!({
            "type": "account",
            "info": {
                "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "owner": "11111111111111111111111111111111",
                "tokenAmount": {
                    "amount": "1500000",
                    "decimals": 6,
                    "uiAmount": 1.5,
                    "uiAmountString": "1.5"
                }
            }
        })))
        .unwrap();

        assert_eq!(account.mint, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(account.amount.base_units(), Some(1_500_000));
        assert_eq!(account.amount.ui_amount, 1.5);
        assert!(!account.is_single_unit());
    }

    #[test]
    fn test_token_account_rejects_unparsed_data() {
        assert!(TokenAccount::from_keyed(&keyed(json!({"type": "mint"}))).is_none());
    }
}
