//! Per-channel refresh metrics
//!
//! Purely observational: nothing on the timing path reads these records.
//! The registry is an explicit handle rather than a global so each process
//! (or each test) owns its own.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Refresh statistics for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub channel_name: String,
    /// Topics registered on the channel
    pub subscription_count: usize,
    /// Unix milliseconds of the latest refresh (never decreases)
    pub last_update_ms: u64,
    /// Refresh callbacks invoked so far
    pub update_count: u64,
    /// Running mean of first-event-to-refresh delay
    pub average_debounce_delay_ms: f64,
}

impl MetricsRecord {
    fn new(channel_name: &str, subscription_count: usize) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            subscription_count,
            last_update_ms: 0,
            update_count: 0,
            average_debounce_delay_ms: 0.0,
        }
    }

    fn apply(&mut self, delay: Duration) {
        self.update_count += 1;
        let n = self.update_count as f64;
        let delay_ms = delay.as_secs_f64() * 1000.0;
        self.average_debounce_delay_ms = (self.average_debounce_delay_ms * (n - 1.0) + delay_ms) / n;
        self.last_update_ms = self.last_update_ms.max(current_timestamp_ms());
    }
}

/// Shared registry of [`MetricsRecord`]s keyed by channel name
///
/// Clones share the same records.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    records: Arc<DashMap<String, MetricsRecord, ahash::RandomState>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::with_hasher(ahash::RandomState::new())),
        }
    }

    /// Record one refresh on a channel
    ///
    /// Creates the record on first use.
    pub fn record(&self, channel_name: &str, debounce_delay: Duration) {
        self.upsert(channel_name, None, debounce_delay);
    }

    /// Record one refresh, also updating the channel's topic count
    pub fn record_with_subscriptions(
        &self,
        channel_name: &str,
        subscription_count: usize,
        debounce_delay: Duration,
    ) {
        self.upsert(channel_name, Some(subscription_count), debounce_delay);
    }

    fn upsert(&self, channel_name: &str, subscription_count: Option<usize>, delay: Duration) {
        if let Some(mut record) = self.records.get_mut(channel_name) {
            if let Some(count) = subscription_count {
                record.subscription_count = count;
            }
            record.apply(delay);
            return;
        }

        let mut record = MetricsRecord::new(channel_name, subscription_count.unwrap_or(0));
        record.apply(delay);
        self.records
            .entry(channel_name.to_string())
            .and_modify(|existing| {
                if let Some(count) = subscription_count {
                    existing.subscription_count = count;
                }
                existing.apply(delay);
            })
            .or_insert(record);
    }

    pub fn get(&self, channel_name: &str) -> Option<MetricsRecord> {
        self.records.get(channel_name).map(|r| r.value().clone())
    }

    /// Snapshot of every record, sorted by channel name
    pub fn get_all(&self) -> Vec<MetricsRecord> {
        let mut all: Vec<MetricsRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.channel_name.cmp(&b.channel_name));
        all
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Get current timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
