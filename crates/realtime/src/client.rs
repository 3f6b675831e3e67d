//! Entry point tying transport, config and metrics together

use crate::channel::ChannelManager;
use crate::scope::{RefreshFn, ScopeHandle, ScopeKind, ScopeOptions};
use crate::transport::Transport;
use ripple_core::{MetricsRecord, MetricsRegistry, RealtimeConfig, Result};
use std::sync::Arc;

/// Realtime change notifications for a set of scopes
///
/// Cheap to clone; clones share the transport and metrics registry.
#[derive(Clone)]
pub struct Realtime {
    manager: ChannelManager,
    metrics: MetricsRegistry,
    config: RealtimeConfig,
}

impl Realtime {
    pub fn new(transport: Arc<dyn Transport>, config: RealtimeConfig) -> Self {
        Self::with_metrics(transport, config, MetricsRegistry::new())
    }

    /// Share an existing registry, e.g. one read by a dashboard
    pub fn with_metrics(transport: Arc<dyn Transport>, config: RealtimeConfig, metrics: MetricsRegistry) -> Self {
        let manager = ChannelManager::new(transport).with_debug(config.debug);
        Self {
            manager,
            metrics,
            config,
        }
    }

    /// Bind a scope; the returned handle owns the channel
    ///
    /// Must be called within a tokio runtime. Teardown only guarantees that no
    /// refresh follows it on a `current_thread` runtime; on a multi-thread
    /// runtime a timer already past its state check may still invoke the
    /// callback once after [`ScopeHandle::teardown`] returns.
    pub fn configure(&self, kind: ScopeKind, options: ScopeOptions, on_refresh: RefreshFn) -> Result<ScopeHandle> {
        ScopeHandle::bind(
            kind,
            options,
            self.config.defaults.clone(),
            self.manager.clone(),
            self.metrics.clone(),
            on_refresh,
        )
    }

    pub fn workspace(&self, options: ScopeOptions, on_refresh: RefreshFn) -> Result<ScopeHandle> {
        self.configure(ScopeKind::Workspace, options, on_refresh)
    }

    pub fn entity(
        &self,
        foreign_key: impl Into<String>,
        options: ScopeOptions,
        on_refresh: RefreshFn,
    ) -> Result<ScopeHandle> {
        self.configure(ScopeKind::entity(foreign_key), options, on_refresh)
    }

    pub fn global(&self, options: ScopeOptions, on_refresh: RefreshFn) -> Result<ScopeHandle> {
        self.configure(ScopeKind::Global, options, on_refresh)
    }

    /// Same as [`ScopeHandle::teardown`]
    pub fn teardown(&self, handle: &mut ScopeHandle) {
        handle.teardown();
    }

    /// Snapshot of every channel's metrics, sorted by channel name
    pub fn get_metrics(&self) -> Vec<MetricsRecord> {
        self.metrics.get_all()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}

impl std::fmt::Debug for Realtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realtime")
            .field("config", &self.config)
            .field("channels", &self.metrics.len())
            .finish()
    }
}
