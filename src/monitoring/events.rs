use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_account_decoder::UiAccount;
use solana_client::rpc_response::{Response, RpcKeyedAccount, RpcLogsResponse, SlotInfo};
use solana_sdk::clock::Slot;
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::error::Result;
use crate::solana::address::parse_address;

/// Kind of push notification a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionKind {
    AccountChange,
    ProgramAccountChange,
    SlotChange,
    RootChange,
    Logs,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionKind::AccountChange => "accountChange",
            SubscriptionKind::ProgramAccountChange => "programAccountChange",
            SubscriptionKind::SlotChange => "slotChange",
            SubscriptionKind::RootChange => "rootChange",
            SubscriptionKind::Logs => "logs",
        };
        f.write_str(name)
    }
}

/// What to watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubscriptionRequest {
    AccountChange { address: String },
    #[serde(rename_all = "camelCase")]
    ProgramAccountChange { program_id: String },
    SlotChange,
    RootChange,
    /// Logs of transactions mentioning `mentions`, or all transactions when absent
    Logs {
        #[serde(default)]
        mentions: Option<String>,
    },
}

/// A request with its addresses validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchTarget {
    Account(Pubkey),
    Program(Pubkey),
    Slot,
    Root,
    Logs(Option<Pubkey>),
}

impl SubscriptionRequest {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            SubscriptionRequest::AccountChange { .. } => SubscriptionKind::AccountChange,
            SubscriptionRequest::ProgramAccountChange { .. } => SubscriptionKind::ProgramAccountChange,
            SubscriptionRequest::SlotChange => SubscriptionKind::SlotChange,
            SubscriptionRequest::RootChange => SubscriptionKind::RootChange,
            SubscriptionRequest::Logs { .. } => SubscriptionKind::Logs,
        }
    }

    /// Address the subscription is filtered on, if any
    pub fn filter_address(&self) -> Option<&str> {
        match self {
            SubscriptionRequest::AccountChange { address } => Some(address),
            SubscriptionRequest::ProgramAccountChange { program_id } => Some(program_id),
            SubscriptionRequest::Logs { mentions } => mentions.as_deref(),
            SubscriptionRequest::SlotChange | SubscriptionRequest::RootChange => None,
        }
    }

    pub(crate) fn target(&self) -> Result<WatchTarget> {
        Ok(match self {
            SubscriptionRequest::AccountChange { address } => WatchTarget::Account(parse_address(address)?),
            SubscriptionRequest::ProgramAccountChange { program_id } => {
                WatchTarget::Program(parse_address(program_id)?)
            }
            SubscriptionRequest::SlotChange => WatchTarget::Slot,
            SubscriptionRequest::RootChange => WatchTarget::Root,
            SubscriptionRequest::Logs { mentions } => WatchTarget::Logs(
                mentions.as_deref().map(parse_address).transpose()?,
            ),
        })
    }
}

/// Chain fields carried by an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    AccountChange {
        address: String,
        slot: Slot,
        lamports: u64,
        owner: String,
        executable: bool,
        rent_epoch: u64,
    },
    #[serde(rename_all = "camelCase")]
    ProgramAccountChange {
        program_id: String,
        address: String,
        slot: Slot,
        lamports: u64,
        owner: String,
    },
    SlotChange { slot: Slot, parent: Slot, root: Slot },
    RootChange { root: Slot },
    Logs {
        signature: String,
        slot: Slot,
        logs: Vec<String>,
        error: Option<String>,
    },
}

impl EventPayload {
    pub(crate) fn account_change(address: &Pubkey, update: Response<UiAccount>) -> Self {
        EventPayload::AccountChange {
            address: address.to_string(),
            slot: update.context.slot,
            lamports: update.value.lamports,
            owner: update.value.owner,
            executable: update.value.executable,
            rent_epoch: update.value.rent_epoch,
        }
    }

    pub(crate) fn program_account_change(program_id: &Pubkey, update: Response<RpcKeyedAccount>) -> Self {
        EventPayload::ProgramAccountChange {
            program_id: program_id.to_string(),
            address: update.value.pubkey,
            slot: update.context.slot,
            lamports: update.value.account.lamports,
            owner: update.value.account.owner,
        }
    }

    pub(crate) fn slot_change(info: SlotInfo) -> Self {
        EventPayload::SlotChange {
            slot: info.slot,
            parent: info.parent,
            root: info.root,
        }
    }

    pub(crate) fn logs(update: Response<RpcLogsResponse>) -> Self {
        EventPayload::Logs {
            signature: update.value.signature,
            slot: update.context.slot,
            logs: update.value.logs,
            error: update.value.err.map(|err| err.to_string()),
        }
    }
}

/// One push notification, stamped when it was received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub subscription_id: u64,
    pub kind: SubscriptionKind,
    pub captured_at: DateTime<Utc>,
    pub payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use solana_client::rpc_response::RpcResponseContext;
    use solana_sdk::instruction::InstructionError;
    use solana_sdk::transaction::TransactionError;

    #[test]
    fn test_request_target_validates_addresses() {
        let program = Pubkey::new_unique();
        let request = SubscriptionRequest::ProgramAccountChange {
            program_id: program.to_string(),
        };
        assert_eq!(request.kind(), SubscriptionKind::ProgramAccountChange);
        assert_eq!(request.target().unwrap(), WatchTarget::Program(program));

        let bad = SubscriptionRequest::Logs {
            mentions: Some("invalid".to_string()),
        };
        assert!(matches!(bad.target(), Err(Error::InvalidAddress(_))));
        assert_eq!(
            SubscriptionRequest::Logs { mentions: None }.target().unwrap(),
            WatchTarget::Logs(None)
        );
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let request: SubscriptionRequest =
            serde_json::from_str(r#"{"kind":"accountChange","address":"11111111111111111111111111111111"}"#)
                .unwrap();
        assert_eq!(request.filter_address(), Some("11111111111111111111111111111111"));
        let request: SubscriptionRequest = serde_json::from_str(r#"{"kind":"slotChange"}"#).unwrap();
        assert_eq!(request, SubscriptionRequest::SlotChange);
    }

    #[test]
    fn test_failed_transaction_logs_keep_error() {
        let update = Response {
            context: RpcResponseContext {
                slot: 42,
                api_version: None,
            },
            value: RpcLogsResponse {
                signature: "sig".to_string(),
                err: Some(TransactionError::InstructionError(0, InstructionError::Custom(1))),
                logs: vec!["Program log: first".to_string(), "Program log: second".to_string()],
            },
        };

        match EventPayload::logs(update) {
            EventPayload::Logs { slot, logs, error, .. } => {
                assert_eq!(slot, 42);
                assert_eq!(logs[0], "Program log: first");
                assert!(error.unwrap().contains("custom program error"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
