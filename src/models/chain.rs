use serde::{Deserialize, Serialize};
use solana_client::rpc_response::{RpcContactInfo, RpcSupply, RpcVersionInfo, RpcVoteAccountInfo};
use solana_sdk::clock::{Epoch, Slot};
use solana_sdk::epoch_info::EpochInfo;
use std::time::Duration;

use crate::utils::lamports_to_sol;

/// Progress through the current epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochProgress {
    pub epoch: Epoch,
    pub absolute_slot: Slot,
    pub block_height: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub slots_remaining: u64,
    /// Percentage of the epoch already elapsed
    pub progress_percent: f64,
    pub estimated_seconds_remaining: u64,
    pub estimated_hours_remaining: f64,
}

impl EpochProgress {
    /// Derive remaining slots and wall-clock estimates at the given slot time
    pub fn from_epoch_info(info: &EpochInfo, slot_duration: Duration) -> Self {
        let slots_remaining = info.slots_in_epoch.saturating_sub(info.slot_index);
        let remaining = slot_duration.saturating_mul(u32::try_from(slots_remaining).unwrap_or(u32::MAX));
        let progress_percent = if info.slots_in_epoch == 0 {
            0.0
        } else {
            info.slot_index as f64 / info.slots_in_epoch as f64 * 100.0
        };

        Self {
            epoch: info.epoch,
            absolute_slot: info.absolute_slot,
            block_height: info.block_height,
            slot_index: info.slot_index,
            slots_in_epoch: info.slots_in_epoch,
            slots_remaining,
            progress_percent,
            estimated_seconds_remaining: remaining.as_secs(),
            estimated_hours_remaining: remaining.as_secs_f64() / 3600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    pub activated_stake: u64,
    pub commission: u8,
    pub last_vote: u64,
    pub root_slot: Slot,
    pub epoch_credits: Vec<(Epoch, u64, u64)>,
}

impl From<RpcVoteAccountInfo> for Validator {
    fn from(info: RpcVoteAccountInfo) -> Self {
        Self {
            vote_pubkey: info.vote_pubkey,
            node_pubkey: info.node_pubkey,
            activated_stake: info.activated_stake,
            commission: info.commission,
            last_vote: info.last_vote,
            root_slot: info.root_slot,
            epoch_credits: info.epoch_credits,
        }
    }
}

/// Vote accounts split by delinquency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSet {
    pub current: Vec<Validator>,
    pub delinquent: Vec<Validator>,
    pub current_count: usize,
    pub delinquent_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    pub pubkey: String,
    pub gossip: Option<String>,
    pub tpu: Option<String>,
    pub rpc: Option<String>,
    pub version: Option<String>,
    pub feature_set: Option<u32>,
    pub shred_version: Option<u16>,
}

impl From<RpcContactInfo> for ClusterNode {
    fn from(info: RpcContactInfo) -> Self {
        Self {
            pubkey: info.pubkey,
            gossip: info.gossip.map(|addr| addr.to_string()),
            tpu: info.tpu.map(|addr| addr.to_string()),
            rpc: info.rpc.map(|addr| addr.to_string()),
            version: info.version,
            feature_set: info.feature_set,
            shred_version: info.shred_version,
        }
    }
}

/// Result of a health probe; failures carry the original message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub healthy: bool,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            healthy: true,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: message.into(),
            healthy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub solana_core: String,
    pub feature_set: Option<u32>,
}

impl From<RpcVersionInfo> for VersionInfo {
    fn from(info: RpcVersionInfo) -> Self {
        Self {
            solana_core: info.solana_core,
            feature_set: info.feature_set,
        }
    }
}

/// Native supply totals in lamports and SOL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyTotals {
    pub total: u64,
    pub total_sol: f64,
    pub circulating: u64,
    pub circulating_sol: f64,
    pub non_circulating: u64,
    pub non_circulating_sol: f64,
}

impl From<RpcSupply> for SupplyTotals {
    fn from(supply: RpcSupply) -> Self {
        Self {
            total: supply.total,
            total_sol: lamports_to_sol(supply.total),
            circulating: supply.circulating,
            circulating_sol: lamports_to_sol(supply.circulating),
            non_circulating: supply.non_circulating,
            non_circulating_sol: lamports_to_sol(supply.non_circulating),
        }
    }
}
