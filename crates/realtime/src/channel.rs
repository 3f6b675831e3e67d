//! Channel subscription management
//!
//! One transport channel per call to [`ChannelManager::open`], N topic
//! handlers on it, all routed to a single [`EventSink`]. Closing is
//! synchronous: when [`ChannelHandle::close`] returns, the sink has been
//! closed and the transport subscription released.

use crate::debounce::DebounceCoordinator;
use crate::transport::{EventHandler, StatusHandler, Subscription, Transport};
use parking_lot::Mutex;
use ripple_core::{ConnectionStatus, RealtimeError, Result, TopicSubscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Receiver of raw "something changed" events for one channel
pub trait EventSink: Send + Sync {
    /// One raw event arrived
    fn notify(&self);

    /// The channel is going away; nothing may fire after this returns
    fn close(&self);
}

impl EventSink for DebounceCoordinator {
    fn notify(&self) {
        DebounceCoordinator::notify(self);
    }

    fn close(&self) {
        DebounceCoordinator::close(self);
    }
}

/// Opens and closes channels on a transport
#[derive(Clone)]
pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    debug: bool,
}

impl ChannelManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            debug: false,
        }
    }

    /// Log connect/disconnect/status at info instead of debug
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Open a channel and route every topic to `sink`
    ///
    /// `on_status` receives connection transitions for observability only.
    pub fn open(
        &self,
        channel_name: &str,
        topics: &[TopicSubscription],
        sink: Arc<dyn EventSink>,
        on_status: Option<StatusHandler>,
    ) -> Result<ChannelHandle> {
        if topics.is_empty() {
            return Err(RealtimeError::NoTopics(channel_name.to_string()));
        }

        let mut channel = self.transport.open(channel_name)?;
        let active = Arc::new(AtomicBool::new(true));

        for topic in topics {
            let active = active.clone();
            let sink = sink.clone();
            let handler: EventHandler = Arc::new(move || {
                if active.load(Ordering::SeqCst) {
                    sink.notify();
                }
            });
            channel.on(topic, handler);
        }

        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));
        let status_handler = status_forwarder(
            channel_name.to_string(),
            status.clone(),
            active.clone(),
            self.debug,
            on_status,
        );

        let subscription = match channel.subscribe(status_handler) {
            Ok(subscription) => subscription,
            Err(e) => {
                active.store(false, Ordering::SeqCst);
                warn!(channel = channel_name, "subscribe failed: {}", e);
                return Err(e.into());
            }
        };

        if self.debug {
            info!(channel = channel_name, topics = topics.len(), "channel opened");
        } else {
            debug!(channel = channel_name, topics = topics.len(), "channel opened");
        }

        Ok(ChannelHandle {
            id: Ulid::new(),
            name: channel_name.to_string(),
            topic_count: topics.len(),
            subscription: Some(subscription),
            transport: self.transport.clone(),
            sink,
            active,
            status,
            debug: self.debug,
        })
    }

    /// Close a channel; no-op if already closed
    pub fn close(&self, handle: &mut ChannelHandle) {
        handle.close();
    }
}

fn status_forwarder(
    channel_name: String,
    status: Arc<Mutex<ConnectionStatus>>,
    active: Arc<AtomicBool>,
    debug: bool,
    on_status: Option<StatusHandler>,
) -> StatusHandler {
    Arc::new(move |next: ConnectionStatus| {
        if !active.load(Ordering::SeqCst) {
            return;
        }
        *status.lock() = next;

        if next.is_failure() {
            warn!(channel = %channel_name, status = %next, "channel connection problem");
        } else if debug {
            info!(channel = %channel_name, status = %next, "channel status");
        } else {
            debug!(channel = %channel_name, status = %next, "channel status");
        }

        if let Some(on_status) = &on_status {
            on_status(next);
        }
    })
}

/// An open channel
///
/// Exclusively owned. Dropping an open handle closes it.
pub struct ChannelHandle {
    id: Ulid,
    name: String,
    topic_count: usize,
    subscription: Option<Subscription>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    active: Arc<AtomicBool>,
    status: Arc<Mutex<ConnectionStatus>>,
    debug: bool,
}

impl ChannelHandle {
    /// Identifier for log correlation
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic_count(&self) -> usize {
        self.topic_count
    }

    /// Latest status reported by the transport
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Gate handlers, close the sink, release the transport subscription
    ///
    /// Idempotent.
    pub fn close(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };

        self.active.store(false, Ordering::SeqCst);
        self.sink.close();
        self.transport.close(&subscription);
        *self.status.lock() = ConnectionStatus::Closed;

        if self.debug {
            info!(channel = %self.name, id = %self.id, "channel closed");
        } else {
            debug!(channel = %self.name, id = %self.id, "channel closed");
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("topic_count", &self.topic_count)
            .field("status", &self.status())
            .field("open", &self.is_open())
            .finish()
    }
}
