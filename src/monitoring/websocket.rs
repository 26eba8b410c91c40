use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use log::{debug, info, warn};
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::pubsub_client::{PubsubClient, PubsubClientError};
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter,
};
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Commitment;
use crate::error::{Error, Result};
use crate::monitoring::events::{ChainEvent, EventPayload, SubscriptionKind, SubscriptionRequest, WatchTarget};
use crate::monitoring::registry::{SubscriptionRegistry, SubscriptionState};

type Unsubscribe = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Events buffered per subscription before new ones are dropped
pub(crate) const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Owns the client's websocket channel and every subscription multiplexed over it
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    ws_endpoint: String,
    commitment: Commitment,
    registry: Arc<SubscriptionRegistry>,
    channel: Mutex<Option<Arc<PubsubClient>>>,
    shutdown: CancellationToken,
}

impl SubscriptionManager {
    /// Nothing is opened until the first subscription
    pub fn new(ws_endpoint: impl Into<String>, commitment: Commitment, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ws_endpoint: ws_endpoint.into(),
                commitment,
                registry: Arc::new(SubscriptionRegistry::new()),
                channel: Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Register a server-side watch and return its event stream.
    ///
    /// `commitment` defaults to the client's commitment level.
    pub async fn subscribe(&self, request: SubscriptionRequest, commitment: Option<Commitment>) -> Result<Subscription> {
        let target = request.target()?;
        let commitment = commitment.unwrap_or(self.inner.commitment);
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Held until the watch is registered so teardown cannot race a new subscriber
        let mut channel = self.inner.channel.lock().await;
        let client = match channel.as_ref() {
            Some(client) => client.clone(),
            None => {
                let client = Arc::new(PubsubClient::new(&self.inner.ws_endpoint).await?);
                info!("Opened websocket channel to {}", self.inner.ws_endpoint);
                *channel = Some(client.clone());
                client
            }
        };

        let (subscription, dispatcher) = self.attach(&request, commitment);
        let (ready_tx, ready_rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run(client, target, commitment.into(), dispatcher, ready_tx).await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(
                    "Subscription {} active ({} on {})",
                    subscription.id(),
                    subscription.kind(),
                    subscription.filter_address().unwrap_or("cluster")
                );
                Ok(subscription)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Transient(
                "subscription task ended before the watch was registered".to_string(),
            )),
        }
    }

    /// Cancel one subscription through its handle. Safe to repeat.
    pub fn cancel(&self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    /// Subscriptions that are created or active
    pub fn active_count(&self) -> usize {
        self.inner.registry.open_count()
    }

    /// Cancel every subscription and close the channel
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let client = self.inner.channel.lock().await.take();
        if let Some(client) = client {
            close_channel(&self.inner.ws_endpoint, client).await;
        }
    }

    /// Create the registry entry, the caller's handle and the delivering half
    pub(crate) fn attach(&self, request: &SubscriptionRequest, commitment: Commitment) -> (Subscription, Dispatcher) {
        let id = self.inner.registry.register();
        let token = self.inner.shutdown.child_token();
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let kind = request.kind();

        let subscription = Subscription {
            handle: SubscriptionHandle {
                id,
                token: token.clone(),
                registry: self.inner.registry.clone(),
            },
            kind,
            filter_address: request.filter_address().map(str::to_string),
            commitment,
            receiver,
        };
        let dispatcher = Dispatcher {
            id,
            kind,
            token,
            registry: self.inner.registry.clone(),
            sender,
        };
        (subscription, dispatcher)
    }
}

impl ManagerInner {
    async fn run(
        self: Arc<Self>,
        client: Arc<PubsubClient>,
        target: WatchTarget,
        commitment: CommitmentConfig,
        dispatcher: Dispatcher,
        ready: oneshot::Sender<Result<()>>,
    ) {
        let id = dispatcher.id;
        watch(&client, target, commitment, &dispatcher, ready).await;
        drop(client);
        drop(dispatcher);
        self.release(id).await;
    }

    /// Forget a finished subscription and close the channel if nothing else uses it
    async fn release(&self, id: u64) {
        self.registry.cancel(id);
        debug!("Subscription {} released", id);

        let mut channel = self.channel.lock().await;
        if self.registry.open_count() > 0 {
            return;
        }
        if let Some(client) = channel.take() {
            drop(channel);
            close_channel(&self.ws_endpoint, client).await;
        }
    }
}

async fn close_channel(ws_endpoint: &str, client: Arc<PubsubClient>) {
    // otherwise the last exiting subscription task drops it
    if let Ok(client) = Arc::try_unwrap(client) {
        if let Err(e) = client.shutdown().await {
            warn!("Websocket channel to {} did not close cleanly: {}", ws_endpoint, e);
        }
    }
    info!("Closed websocket channel to {}", ws_endpoint);
}

async fn watch(
    client: &PubsubClient,
    target: WatchTarget,
    commitment: CommitmentConfig,
    dispatcher: &Dispatcher,
    ready: oneshot::Sender<Result<()>>,
) {
    let account_config = RpcAccountInfoConfig {
        encoding: Some(UiAccountEncoding::Base64),
        commitment: Some(commitment),
        ..RpcAccountInfoConfig::default()
    };

    match target {
        WatchTarget::Account(address) => {
            let registration = client.account_subscribe(&address, Some(account_config)).await;
            dispatcher
                .serve(registration, ready, |update| EventPayload::account_change(&address, update))
                .await
        }
        WatchTarget::Program(program_id) => {
            let config = RpcProgramAccountsConfig {
                account_config,
                ..RpcProgramAccountsConfig::default()
            };
            let registration = client.program_subscribe(&program_id, Some(config)).await;
            dispatcher
                .serve(registration, ready, |update| {
                    EventPayload::program_account_change(&program_id, update)
                })
                .await
        }
        WatchTarget::Slot => {
            let registration = client.slot_subscribe().await;
            dispatcher.serve(registration, ready, EventPayload::slot_change).await
        }
        WatchTarget::Root => {
            let registration = client.root_subscribe().await;
            dispatcher
                .serve(registration, ready, |root| EventPayload::RootChange { root })
                .await
        }
        WatchTarget::Logs(mentions) => {
            let filter = match mentions {
                Some(address) => RpcTransactionLogsFilter::Mentions(vec![address.to_string()]),
                None => RpcTransactionLogsFilter::All,
            };
            let config = RpcTransactionLogsConfig {
                commitment: Some(commitment),
            };
            let registration = client.logs_subscribe(filter, config).await;
            dispatcher.serve(registration, ready, EventPayload::logs).await
        }
    }
}

/// Delivering half of one subscription, owned by its pump task
pub(crate) struct Dispatcher {
    id: u64,
    kind: SubscriptionKind,
    token: CancellationToken,
    registry: Arc<SubscriptionRegistry>,
    sender: mpsc::Sender<ChainEvent>,
}

impl Dispatcher {
    async fn serve<'a, T, F>(
        &self,
        registration: std::result::Result<(BoxStream<'a, T>, Unsubscribe), PubsubClientError>,
        ready: oneshot::Sender<Result<()>>,
        translate: F,
    ) where
        F: FnMut(T) -> EventPayload + Send,
    {
        let (notifications, unsubscribe) = match registration {
            Ok(registered) => registered,
            Err(e) => {
                warn!("Subscription {} ({}) was rejected: {}", self.id, self.kind, e);
                let _ = ready.send(Err(e.into()));
                return;
            }
        };

        if !self.registry.activate(self.id) {
            let _ = ready.send(Err(Error::Cancelled));
            unsubscribe().await;
            return;
        }
        let _ = ready.send(Ok(()));

        self.pump(notifications.map(translate)).await;
        unsubscribe().await;
        debug!("Subscription {} unsubscribed", self.id);
    }

    /// Forward payloads in server order until cancelled or the stream ends
    pub(crate) async fn pump<S>(&self, mut payloads: S)
    where
        S: Stream<Item = EventPayload> + Unpin,
    {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                payload = payloads.next() => match payload {
                    Some(payload) => {
                        if !self.deliver(payload) {
                            break;
                        }
                    }
                    None => {
                        warn!("Subscription {} stream closed by the server", self.id);
                        break;
                    }
                },
            }
        }
    }

    /// Hand one event to the subscriber. False once the subscription is gone.
    ///
    /// A subscriber that lets its queue fill up loses the newest events.
    pub(crate) fn deliver(&self, payload: EventPayload) -> bool {
        let event = ChainEvent {
            subscription_id: self.id,
            kind: self.kind,
            captured_at: chrono::Utc::now(),
            payload,
        };
        self.registry.deliver_if_active(self.id, || {
            if self.token.is_cancelled() {
                return false;
            }
            match self.sender.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    warn!(
                        "Subscription {} ({}) queue full, dropped event captured at {}",
                        self.id, self.kind, event.captured_at
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        })
    }
}

/// Cloneable cancel capability for a subscription, usable from any task
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    token: CancellationToken,
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
        if self.registry.cancel(self.id) {
            debug!("Subscription {} cancelled", self.id);
        }
    }

    pub fn state(&self) -> SubscriptionState {
        if self.token.is_cancelled() {
            SubscriptionState::Cancelled
        } else {
            self.registry.state(self.id)
        }
    }
}

/// Receiving side of a subscription. Dropping it cancels the watch.
pub struct Subscription {
    handle: SubscriptionHandle,
    kind: SubscriptionKind,
    filter_address: Option<String>,
    commitment: Commitment,
    receiver: mpsc::Receiver<ChainEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.handle.id
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn filter_address(&self) -> Option<&str> {
        self.filter_address.as_deref()
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Next event, or `None` once cancelled or closed.
    ///
    /// An event already queued when `cancel` ran is discarded.
    pub async fn next_event(&mut self) -> Option<ChainEvent> {
        let token = self.handle.token.clone();
        if token.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            _ = token.cancelled() => None,
            event = self.receiver.recv() => event,
        }?;
        if token.is_cancelled() {
            return None;
        }
        Some(event)
    }

    pub fn into_stream(self) -> impl Stream<Item = ChainEvent> + Send {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.next_event().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
