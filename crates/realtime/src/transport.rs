//! Transport client interface
//!
//! The client that actually talks to the server lives outside this crate.
//! It only has to open named channels, attach per-topic handlers, report
//! connection status and release a subscription on request.

use ripple_core::{ConnectionStatus, TopicSubscription, TransportError};
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Called once per matching row change. Carries no payload.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Called on every connection status transition
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// A subscribed channel, as handed back by [`ChannelRef::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: Ulid,
    pub channel_name: String,
}

impl Subscription {
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            channel_name: channel_name.into(),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.channel_name, self.id)
    }
}

/// Realtime transport client
pub trait Transport: Send + Sync {
    /// Start building a channel; nothing is delivered until it is subscribed
    fn open(&self, channel_name: &str) -> Result<Box<dyn ChannelRef>, TransportError>;

    /// Release a subscription and every handler registered on it
    fn close(&self, subscription: &Subscription);
}

/// A channel under construction
pub trait ChannelRef: Send {
    fn name(&self) -> &str;

    /// Attach a handler for one topic
    fn on(&mut self, topic: &TopicSubscription, handler: EventHandler);

    /// Activate the channel
    fn subscribe(self: Box<Self>, on_status: StatusHandler) -> Result<Subscription, TransportError>;
}
