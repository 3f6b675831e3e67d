//! Shared types for the ripple change-notification layer
//!
//! This crate provides:
//! - Topic descriptions (table, schema, event kind, row filter)
//! - Transport connection status
//! - Debounce timing policy
//! - Process-wide metrics registry (observability only)
//! - TOML configuration with per-scope defaults

pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod status;
pub mod topic;

// Re-exports
pub use config::{RealtimeConfig, ScopeDefaults};
pub use error::{RealtimeError, TransportError};
pub use metrics::{MetricsRecord, MetricsRegistry};
pub use policy::{DebouncePolicy, MaxWait, DEFAULT_MAX_WAIT_MS};
pub use status::ConnectionStatus;
pub use topic::{EventKind, Filter, FilterOp, RowChange, TopicSubscription, DEFAULT_SCHEMA};

/// Result type for ripple operations
pub type Result<T> = std::result::Result<T, RealtimeError>;
