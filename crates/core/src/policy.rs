//! Debounce timing policy

use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Max-wait used when a caller asks for one without naming a value
pub const DEFAULT_MAX_WAIT_MS: u64 = 5000;

/// Max-wait as written in options and config files
///
/// `false` leaves the delay unbounded, `true` picks the default bound and
/// an integer is an explicit bound in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxWait {
    Enabled(bool),
    Millis(u64),
}

impl MaxWait {
    pub fn resolve(&self, default_ms: u64) -> Option<Duration> {
        match *self {
            MaxWait::Enabled(false) => None,
            MaxWait::Enabled(true) => Some(Duration::from_millis(default_ms)),
            MaxWait::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for MaxWait {
    fn default() -> Self {
        MaxWait::Enabled(false)
    }
}

impl From<u64> for MaxWait {
    fn from(ms: u64) -> Self {
        MaxWait::Millis(ms)
    }
}

impl From<bool> for MaxWait {
    fn from(enabled: bool) -> Self {
        MaxWait::Enabled(enabled)
    }
}

/// Leading/trailing/max-wait debounce policy
///
/// The single source of timing truth for every channel, whatever its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Quiet period before a trailing fire
    pub debounce: Duration,
    /// Upper bound on the delay between callbacks during a continuous burst
    pub max_wait: Option<Duration>,
    /// Fire on the first event after an idle period
    pub leading: bool,
    /// Fire once the quiet period after the last event elapses
    pub trailing: bool,
}

impl DebouncePolicy {
    /// Trailing-edge only policy
    pub fn trailing(debounce: Duration) -> Self {
        Self {
            debounce,
            max_wait: None,
            leading: false,
            trailing: true,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self.normalized()
    }

    pub fn with_leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    pub fn with_trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    /// Clamp a max-wait shorter than the debounce window up to the window
    pub fn normalized(mut self) -> Self {
        if let Some(max_wait) = self.max_wait {
            if max_wait < self.debounce {
                warn!(
                    "max_wait {:?} is shorter than debounce {:?}; using debounce as max_wait",
                    max_wait, self.debounce
                );
                self.max_wait = Some(self.debounce);
            }
        }
        self
    }

    /// Reject a policy that can never fire
    pub fn validate(&self) -> Result<(), RealtimeError> {
        if !self.leading && !self.trailing && self.max_wait.is_none() {
            return Err(RealtimeError::InvalidPolicy(
                "leading and trailing are both disabled and no max_wait is set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self::trailing(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_wait_resolve() {
        assert_eq!(MaxWait::Enabled(false).resolve(5000), None);
        assert_eq!(MaxWait::Enabled(true).resolve(5000), Some(Duration::from_millis(5000)));
        assert_eq!(MaxWait::Millis(600).resolve(5000), Some(Duration::from_millis(600)));
    }

    #[test]
    fn test_max_wait_untagged_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            max_wait: MaxWait,
        }

        let flag: Wrapper = toml::from_str("max_wait = true").unwrap();
        assert_eq!(flag.max_wait, MaxWait::Enabled(true));

        let millis: Wrapper = toml::from_str("max_wait = 750").unwrap();
        assert_eq!(millis.max_wait, MaxWait::Millis(750));
    }

    #[test]
    fn test_max_wait_clamped_to_debounce() {
        let policy = DebouncePolicy::trailing(Duration::from_millis(500))
            .with_max_wait(Some(Duration::from_millis(100)));
        assert_eq!(policy.max_wait, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_inert_policy_rejected() {
        let inert = DebouncePolicy::trailing(Duration::from_millis(100)).with_trailing(false);
        assert!(inert.validate().is_err());

        let leading_only = inert.with_leading(true);
        assert!(leading_only.validate().is_ok());

        let max_wait_only = inert.with_max_wait(Some(Duration::from_millis(300)));
        assert!(max_wait_only.validate().is_ok());
    }
}
