//! Debounced realtime subscriptions for ripple
//!
//! This crate provides:
//! - Leading/trailing/max-wait debounce coordination on tokio timers
//! - Channel lifecycle over an abstract transport client
//! - Workspace, entity and global scope bindings
//! - An in-memory transport for simulation and tests

pub mod channel;
pub mod client;
pub mod debounce;
pub mod memory;
pub mod scope;
pub mod transport;

// Re-exports
pub use channel::{ChannelHandle, ChannelManager, EventSink};
pub use client::Realtime;
pub use debounce::{Callback, DebounceCoordinator, DebounceStats, MetricsTap};
pub use memory::{MemoryChannel, MemoryTransport};
pub use scope::{RefreshFn, ScopeHandle, ScopeKind, ScopeOptions};
pub use transport::{ChannelRef, EventHandler, StatusHandler, Subscription, Transport};

pub use ripple_core::{
    ConnectionStatus, DebouncePolicy, EventKind, Filter, MaxWait, MetricsRecord, MetricsRegistry,
    RealtimeConfig, RealtimeError, Result, RowChange, ScopeDefaults, TopicSubscription,
};
