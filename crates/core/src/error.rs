//! Error types

use thiserror::Error;

/// Errors surfaced by the coalescing layer
///
/// Misuse such as tearing down twice or configuring a null scope is not an
/// error; those calls are no-ops.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Timers need a tokio runtime to be spawned on
    #[error("no tokio runtime available to schedule debounce timers")]
    NoRuntime,

    #[error("invalid debounce policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid row filter '{input}': {reason}")]
    InvalidFilter { input: String, reason: String },

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("unknown connection status: {0}")]
    UnknownStatus(String),

    /// A channel needs at least one topic to listen on
    #[error("channel '{0}' has no topics to subscribe to")]
    NoTopics(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures reported by a transport client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open channel '{channel}': {reason}")]
    Open { channel: String, reason: String },

    #[error("failed to subscribe channel '{channel}': {reason}")]
    Subscribe { channel: String, reason: String },
}

impl From<toml::de::Error> for RealtimeError {
    fn from(err: toml::de::Error) -> Self {
        RealtimeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RealtimeError {
    fn from(err: toml::ser::Error) -> Self {
        RealtimeError::Config(err.to_string())
    }
}
