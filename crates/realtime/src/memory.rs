//! In-process transport
//!
//! Routes [`RowChange`]s to subscribed handlers without a server. Used by
//! the CLI simulator and by tests, which also inspect its bookkeeping
//! (open calls, live channels, handler counts).

use crate::transport::{ChannelRef, EventHandler, StatusHandler, Subscription, Transport};
use parking_lot::Mutex;
use ripple_core::{ConnectionStatus, RowChange, TopicSubscription, TransportError};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;
use ulid::Ulid;

type Handlers = SmallVec<[(TopicSubscription, EventHandler); 4]>;

struct LiveChannel {
    subscription: Subscription,
    handlers: Handlers,
    on_status: StatusHandler,
}

struct MemoryState {
    open_calls: usize,
    opened: Vec<String>,
    closed: Vec<String>,
    live: ahash::HashMap<Ulid, LiveChannel>,
    fail_open: bool,
    initial_status: Option<ConnectionStatus>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            open_calls: 0,
            opened: Vec::new(),
            closed: Vec::new(),
            live: ahash::HashMap::default(),
            fail_open: false,
            initial_status: Some(ConnectionStatus::Subscribed),
        }
    }
}

/// In-memory [`Transport`]
///
/// Clones share the same channels.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status reported right after subscribe; `None` reports nothing
    pub fn with_initial_status(self, status: Option<ConnectionStatus>) -> Self {
        self.state.lock().initial_status = status;
        self
    }

    /// Make subsequent `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Deliver a change to every live handler whose topic matches
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, change: &RowChange) -> usize {
        let matching: Vec<EventHandler> = {
            let state = self.state.lock();
            state
                .live
                .values()
                .flat_map(|channel| channel.handlers.iter())
                .filter(|(topic, _)| topic.matches(change))
                .map(|(_, handler)| handler.clone())
                .collect()
        };

        trace!(table = %change.table, kind = %change.kind, handlers = matching.len(), "emit");
        for handler in &matching {
            handler();
        }
        matching.len()
    }

    /// Push a status transition to every live subscription of a channel
    pub fn set_status(&self, channel_name: &str, status: ConnectionStatus) -> usize {
        let targets: Vec<StatusHandler> = {
            let state = self.state.lock();
            state
                .live
                .values()
                .filter(|channel| channel.subscription.channel_name == channel_name)
                .map(|channel| channel.on_status.clone())
                .collect()
        };

        for on_status in &targets {
            on_status(status);
        }
        targets.len()
    }

    /// Number of `open` calls, failed ones included
    pub fn open_count(&self) -> usize {
        self.state.lock().open_calls
    }

    /// Channel names in the order they were opened
    pub fn opened_channels(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    /// Channel names in the order they were closed
    pub fn closed_channels(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }

    /// Names of currently subscribed channels, sorted
    pub fn live_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .live
            .values()
            .map(|channel| channel.subscription.channel_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Handlers registered across live subscriptions of a channel
    pub fn handler_count(&self, channel_name: &str) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|channel| channel.subscription.channel_name == channel_name)
            .map(|channel| channel.handlers.len())
            .sum()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, channel_name: &str) -> Result<Box<dyn ChannelRef>, TransportError> {
        let mut state = self.state.lock();
        state.open_calls += 1;

        if state.fail_open {
            return Err(TransportError::Open {
                channel: channel_name.to_string(),
                reason: "transport configured to refuse".to_string(),
            });
        }

        state.opened.push(channel_name.to_string());
        Ok(Box::new(MemoryChannel {
            state: self.state.clone(),
            name: channel_name.to_string(),
            handlers: Handlers::new(),
        }))
    }

    fn close(&self, subscription: &Subscription) {
        let removed = self.state.lock().live.remove(&subscription.id);
        if let Some(channel) = removed {
            trace!(subscription = %channel.subscription, "released");
            self.state.lock().closed.push(channel.subscription.channel_name);
        }
    }
}

/// Channel under construction on a [`MemoryTransport`]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
    name: String,
    handlers: Handlers,
}

impl ChannelRef for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&mut self, topic: &TopicSubscription, handler: EventHandler) {
        self.handlers.push((topic.clone(), handler));
    }

    fn subscribe(self: Box<Self>, on_status: StatusHandler) -> Result<Subscription, TransportError> {
        let MemoryChannel { state, name, handlers } = *self;
        let subscription = Subscription::new(name);

        let initial_status = {
            let mut guard = state.lock();
            guard.live.insert(
                subscription.id,
                LiveChannel {
                    subscription: subscription.clone(),
                    handlers,
                    on_status: on_status.clone(),
                },
            );
            guard.initial_status
        };

        if let Some(status) = initial_status {
            on_status(status);
        }
        Ok(subscription)
    }
}
