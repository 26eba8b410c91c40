use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lifecycle of a subscription. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Created,
    Active,
    Cancelled,
}

/// Subscriptions multiplexed over one client's websocket channel.
///
/// Delivery and cancellation take the same lock, so once `cancel` returns no
/// further event can be handed to that subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, SubscriptionState>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, SubscriptionState>> {
        // entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new subscription in the `Created` state
    pub fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries().insert(id, SubscriptionState::Created);
        id
    }

    /// `Created → Active`. False if the subscription was cancelled meanwhile.
    pub fn activate(&self, id: u64) -> bool {
        match self.entries().get_mut(&id) {
            Some(state @ SubscriptionState::Created) => {
                *state = SubscriptionState::Active;
                true
            }
            Some(SubscriptionState::Active) => true,
            _ => false,
        }
    }

    /// Move to `Cancelled`. Returns true only for the call that did the transition.
    pub fn cancel(&self, id: u64) -> bool {
        self.entries().remove(&id).is_some()
    }

    pub fn state(&self, id: u64) -> SubscriptionState {
        self.entries()
            .get(&id)
            .copied()
            .unwrap_or(SubscriptionState::Cancelled)
    }

    /// Subscriptions that are not yet cancelled
    pub fn open_count(&self) -> usize {
        self.entries().len()
    }

    /// Run `deliver` while holding the lock if the subscription is active
    pub fn deliver_if_active(&self, id: u64, deliver: impl FnOnce() -> bool) -> bool {
        let entries = self.entries();
        match entries.get(&id) {
            Some(SubscriptionState::Active) => deliver(),
            _ => false,
        }
    }
}
