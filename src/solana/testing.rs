//! Scripted RPC transport for driving services without a node.

use async_trait::async_trait;
use serde_json::{json, Value};
use solana_client::client_error::{ClientError, ClientErrorKind, Result as ClientResult};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::RpcClientConfig;
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_sender::{RpcSender, RpcTransportStats};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use crate::config::{Credentials, Network};
use crate::solana::connection::{Connection, ConnectionManager};
use crate::solana::resolver::CredentialResolver;

#[derive(Clone)]
pub(crate) enum Reply {
    Value(Value),
    /// Transport failure before the node answered
    Io(&'static str),
}

/// Replies per request method; the last queued reply repeats
#[derive(Default)]
pub(crate) struct Script {
    replies: Mutex<HashMap<RpcRequest, VecDeque<Reply>>>,
    requests: Mutex<Vec<(RpcRequest, Value)>>,
}

impl Script {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, request: RpcRequest, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(request)
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn value(&self, request: RpcRequest, value: Value) -> &Self {
        self.reply(request, Reply::Value(value))
    }

    /// Params of every call made with `request`, in order
    pub(crate) fn params(&self, request: RpcRequest) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(sent, _)| *sent == request)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub(crate) fn count(&self, request: RpcRequest) -> usize {
        self.params(request).len()
    }

    /// Connection for `credentials` whose RPC traffic is answered by this script
    pub(crate) fn connection(self: &Arc<Self>, credentials: Credentials) -> Connection {
        let config = CredentialResolver::resolve(&credentials).unwrap();
        let client = RpcClient::new_sender(
            ScriptedSender(self.clone()),
            RpcClientConfig::with_commitment(config.commitment.into()),
        );
        ConnectionManager::open_with_client(config, client)
    }

    pub(crate) fn devnet(self: &Arc<Self>) -> Connection {
        self.connection(Credentials::new(Network::Devnet))
    }

    fn next(&self, request: RpcRequest) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(&request)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

struct ScriptedSender(Arc<Script>);

#[async_trait]
impl RpcSender for ScriptedSender {
    async fn send(&self, request: RpcRequest, params: Value) -> ClientResult<Value> {
        self.0.requests.lock().unwrap().push((request, params));
        match self.0.next(request) {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Io(message)) => Err(io::Error::new(io::ErrorKind::ConnectionReset, message).into()),
            None if request == RpcRequest::GetVersion => Ok(json!({"solana-core": "1.18.26", "feature-set": 0})),
            None => Err(ClientError::from(ClientErrorKind::Custom(format!(
                "no scripted reply for {}",
                request
            )))),
        }
    }

    fn get_transport_stats(&self) -> RpcTransportStats {
        RpcTransportStats::default()
    }

    fn url(&self) -> String {
        "scripted".to_string()
    }
}

/// `{"context": .., "value": ..}` wrapper used by most RPC responses
pub(crate) fn with_context(value: Value) -> Value {
    json!({"context": {"slot": 1}, "value": value})
}
