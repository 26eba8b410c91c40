use serde::{Deserialize, Serialize};
use solana_client::rpc_response::{RpcStakeActivation, StakeActivationState};

/// A stake account whose authority matches a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeAccount {
    pub address: String,
    pub lamports: u64,
    pub sol: f64,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Activating,
    Active,
    Deactivating,
    Inactive,
}

impl From<StakeActivationState> for ActivationState {
    fn from(state: StakeActivationState) -> Self {
        match state {
            StakeActivationState::Activating => ActivationState::Activating,
            StakeActivationState::Active => ActivationState::Active,
            StakeActivationState::Deactivating => ActivationState::Deactivating,
            StakeActivationState::Inactive => ActivationState::Inactive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeActivation {
    pub stake_address: String,
    pub state: ActivationState,
    pub active: u64,
    pub inactive: u64,
}

impl StakeActivation {
    pub fn new(stake_address: &str, activation: RpcStakeActivation) -> Self {
        Self {
            stake_address: stake_address.to_string(),
            state: activation.state.into(),
            active: activation.active,
            inactive: activation.inactive,
        }
    }
}
