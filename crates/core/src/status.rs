//! Transport connection status

use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connection status of a channel
///
/// Only ever logged; no timing decision depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Opened, waiting for the transport to confirm
    #[default]
    #[serde(rename = "CONNECTING")]
    Connecting,
    #[serde(rename = "SUBSCRIBED")]
    Subscribed,
    #[serde(rename = "CHANNEL_ERROR")]
    Error,
    #[serde(rename = "TIMED_OUT")]
    TimedOut,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Subscribed => "SUBSCRIBED",
            ConnectionStatus::Error => "CHANNEL_ERROR",
            ConnectionStatus::TimedOut => "TIMED_OUT",
            ConnectionStatus::Closed => "CLOSED",
        }
    }

    /// Error or timeout reported by the transport
    pub fn is_failure(&self) -> bool {
        matches!(self, ConnectionStatus::Error | ConnectionStatus::TimedOut)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECTING" => Ok(ConnectionStatus::Connecting),
            "SUBSCRIBED" => Ok(ConnectionStatus::Subscribed),
            "CHANNEL_ERROR" | "ERROR" => Ok(ConnectionStatus::Error),
            "TIMED_OUT" => Ok(ConnectionStatus::TimedOut),
            "CLOSED" => Ok(ConnectionStatus::Closed),
            _ => Err(RealtimeError::UnknownStatus(s.to_string())),
        }
    }
}
