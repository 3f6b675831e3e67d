//! Realtime configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.

use crate::error::RealtimeError;
use crate::policy::DEFAULT_MAX_WAIT_MS;
use crate::topic::DEFAULT_SCHEMA;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted debounce window
pub const MAX_DEBOUNCE_MS: u64 = 60_000;
/// Largest accepted max-wait bound
pub const MAX_MAX_WAIT_MS: u64 = 600_000;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Log channel connect/disconnect/status at info level
    pub debug: bool,
    pub defaults: ScopeDefaults,
}

/// Default timing per scope kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeDefaults {
    /// Schema for topics that do not name one
    pub schema: String,
    /// Workspace-scoped channels
    pub workspace_debounce_ms: u64,
    /// Single-entity channels (collaboration, lower latency)
    pub entity_debounce_ms: u64,
    /// Unfiltered channels (highest volume)
    pub global_debounce_ms: u64,
    /// Bound used when max-wait is enabled without a value
    pub max_wait_ms: u64,
}

impl Default for ScopeDefaults {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            workspace_debounce_ms: 500,
            entity_debounce_ms: 300,
            global_debounce_ms: 1000,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl ScopeDefaults {
    pub fn workspace_debounce(&self) -> Duration {
        Duration::from_millis(self.workspace_debounce_ms)
    }

    pub fn entity_debounce(&self) -> Duration {
        Duration::from_millis(self.entity_debounce_ms)
    }

    pub fn global_debounce(&self) -> Duration {
        Duration::from_millis(self.global_debounce_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            defaults: ScopeDefaults::default(),
        }
    }
}

impl RealtimeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, RealtimeError> {
        let config: RealtimeConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, RealtimeError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, RealtimeError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RealtimeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), RealtimeError> {
        let d = &self.defaults;

        if d.schema.trim().is_empty() {
            return Err(RealtimeError::Config("defaults.schema must not be empty".to_string()));
        }

        for (key, value) in [
            ("defaults.workspace_debounce_ms", d.workspace_debounce_ms),
            ("defaults.entity_debounce_ms", d.entity_debounce_ms),
            ("defaults.global_debounce_ms", d.global_debounce_ms),
        ] {
            if value > MAX_DEBOUNCE_MS {
                return Err(RealtimeError::Config(format!(
                    "{} must be between 0 and {} (got {})",
                    key, MAX_DEBOUNCE_MS, value
                )));
            }
        }

        if d.max_wait_ms == 0 || d.max_wait_ms > MAX_MAX_WAIT_MS {
            return Err(RealtimeError::Config(format!(
                "defaults.max_wait_ms must be between 1 and {} (got {})",
                MAX_MAX_WAIT_MS, d.max_wait_ms
            )));
        }

        Ok(())
    }
}
