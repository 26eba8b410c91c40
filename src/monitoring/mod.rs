mod events;
mod registry;
mod websocket;

pub use events::{ChainEvent, EventPayload, SubscriptionKind, SubscriptionRequest};
pub use registry::{SubscriptionRegistry, SubscriptionState};
pub use websocket::{Subscription, SubscriptionHandle, SubscriptionManager};
