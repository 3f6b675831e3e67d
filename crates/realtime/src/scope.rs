//! Scope binding adapters
//!
//! A scope (workspace, single entity, or everything) determines the channel
//! name, the row filter on every topic and the default debounce. A
//! [`ScopeHandle`] owns at most one channel plus its coordinator and
//! re-creates both whenever what it derives from its options changes.

use crate::channel::{ChannelHandle, ChannelManager};
use crate::debounce::{Callback, DebounceCoordinator, DebounceStats, MetricsTap};
use futures::future::BoxFuture;
use futures::FutureExt;
use ripple_core::{
    ConnectionStatus, DebouncePolicy, EventKind, Filter, MaxWait, MetricsRegistry, RealtimeError,
    Result, ScopeDefaults, TopicSubscription,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// What a channel's rows are scoped by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// `workspace_id = <scope id>` on every table
    Workspace,
    /// `<foreign_key> = <scope id>`, e.g. one document or file
    Entity { foreign_key: String },
    /// No filter; always bound when enabled
    Global,
}

impl ScopeKind {
    pub fn entity(foreign_key: impl Into<String>) -> Self {
        ScopeKind::Entity {
            foreign_key: foreign_key.into(),
        }
    }

    pub fn default_debounce(&self, defaults: &ScopeDefaults) -> Duration {
        match self {
            ScopeKind::Workspace => defaults.workspace_debounce(),
            ScopeKind::Entity { .. } => defaults.entity_debounce(),
            ScopeKind::Global => defaults.global_debounce(),
        }
    }

    fn filter(&self, scope_id: &str) -> Option<Filter> {
        match self {
            ScopeKind::Workspace => Some(Filter::eq("workspace_id", scope_id)),
            ScopeKind::Entity { foreign_key } => Some(Filter::eq(foreign_key.as_str(), scope_id)),
            ScopeKind::Global => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ScopeKind::Workspace => "workspace",
            ScopeKind::Entity { .. } => "entity",
            ScopeKind::Global => "global",
        }
    }
}

/// Options for a scope binding
///
/// Unset timing fields fall back to the scope kind's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeOptions {
    pub channel_name_prefix: String,
    pub tables: Vec<String>,
    /// `None` (or empty) means no subscription for workspace/entity scopes
    pub scope_id: Option<String>,
    pub debounce_ms: Option<u64>,
    pub max_wait: Option<MaxWait>,
    pub leading: Option<bool>,
    pub trailing: Option<bool>,
    /// Master switch; when false no channel is held
    pub enabled: bool,
    pub schema: Option<String>,
    pub event: EventKind,
}

impl ScopeOptions {
    pub fn new<I, S>(channel_name_prefix: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channel_name_prefix: channel_name_prefix.into(),
            tables: tables.into_iter().map(Into::into).collect(),
            scope_id: None,
            debounce_ms: None,
            max_wait: None,
            leading: None,
            trailing: None,
            enabled: true,
            schema: None,
            event: EventKind::Any,
        }
    }

    pub fn scope_id(mut self, scope_id: Option<impl Into<String>>) -> Self {
        self.scope_id = scope_id.map(Into::into);
        self
    }

    pub fn scope(self, scope_id: impl Into<String>) -> Self {
        self.scope_id(Some(scope_id))
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    pub fn max_wait(mut self, max_wait: impl Into<MaxWait>) -> Self {
        self.max_wait = Some(max_wait.into());
        self
    }

    pub fn leading(mut self, leading: bool) -> Self {
        self.leading = Some(leading);
        self
    }

    pub fn trailing(mut self, trailing: bool) -> Self {
        self.trailing = Some(trailing);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn event(mut self, event: EventKind) -> Self {
        self.event = event;
        self
    }
}

type AsyncRefresh = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum RefreshKind {
    Blocking(Callback),
    Async(AsyncRefresh),
}

/// Consumer refresh callback
///
/// Must not panic and should be idempotent: it is a cue to re-fetch, and
/// the next change re-triggers it if a fetch fails.
#[derive(Clone)]
pub struct RefreshFn {
    kind: RefreshKind,
}

impl RefreshFn {
    /// Synchronous callback, run inline
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            kind: RefreshKind::Blocking(Arc::new(f)),
        }
    }

    /// Async callback; each invocation spawns the returned future
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            kind: RefreshKind::Async(Arc::new(move || f().boxed())),
        }
    }

    fn into_callback(self, runtime: Handle) -> Callback {
        match self.kind {
            RefreshKind::Blocking(callback) => callback,
            RefreshKind::Async(make_future) => Arc::new(move || {
                runtime.spawn(make_future());
            }),
        }
    }
}

impl std::fmt::Debug for RefreshFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            RefreshKind::Blocking(_) => "blocking",
            RefreshKind::Async(_) => "async",
        };
        f.debug_tuple("RefreshFn").field(&kind).finish()
    }
}

/// Everything derived from a scope's options
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelPlan {
    pub name: String,
    pub topics: Vec<TopicSubscription>,
    pub policy: DebouncePolicy,
}

/// Derive the channel for a scope; `None` means no channel should be held
pub(crate) fn plan_channel(
    kind: &ScopeKind,
    options: &ScopeOptions,
    defaults: &ScopeDefaults,
) -> Result<Option<ChannelPlan>> {
    if !options.enabled {
        return Ok(None);
    }

    let scope_id = options
        .scope_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let (suffix, filter) = match (kind, scope_id) {
        (ScopeKind::Global, _) => ("global", None),
        (_, Some(id)) => (id, kind.filter(id)),
        (_, None) => return Ok(None),
    };

    let name = format!("{}-{}", options.channel_name_prefix, suffix);
    if options.tables.is_empty() {
        return Err(RealtimeError::NoTopics(name));
    }

    let schema = options.schema.as_deref().unwrap_or(&defaults.schema);
    let topics = options
        .tables
        .iter()
        .map(|table| {
            let topic = TopicSubscription::table(table.as_str())
                .in_schema(schema)
                .on_event(options.event);
            match &filter {
                Some(filter) => topic.with_filter(filter.clone()),
                None => topic,
            }
        })
        .collect();

    let debounce = options
        .debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| kind.default_debounce(defaults));
    let max_wait = options
        .max_wait
        .unwrap_or_default()
        .resolve(defaults.max_wait_ms);

    let policy = DebouncePolicy::trailing(debounce)
        .with_leading(options.leading.unwrap_or(false))
        .with_trailing(options.trailing.unwrap_or(true))
        .with_max_wait(max_wait);
    policy.validate()?;

    Ok(Some(ChannelPlan { name, topics, policy }))
}

struct ActiveScope {
    plan: ChannelPlan,
    coordinator: DebounceCoordinator,
    channel: ChannelHandle,
}

/// A bound scope: owns at most one channel and its coordinator
///
/// Dropping the handle tears it down.
pub struct ScopeHandle {
    kind: ScopeKind,
    options: ScopeOptions,
    defaults: ScopeDefaults,
    manager: ChannelManager,
    metrics: MetricsRegistry,
    callback: Callback,
    active: Option<ActiveScope>,
    torn_down: bool,
}

impl ScopeHandle {
    pub(crate) fn bind(
        kind: ScopeKind,
        options: ScopeOptions,
        defaults: ScopeDefaults,
        manager: ChannelManager,
        metrics: MetricsRegistry,
        on_refresh: RefreshFn,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;

        let mut handle = Self {
            kind,
            options,
            defaults,
            manager,
            metrics,
            callback: on_refresh.into_callback(runtime),
            active: None,
            torn_down: false,
        };
        let plan = plan_channel(&handle.kind, &handle.options, &handle.defaults)?;
        handle.apply(plan)?;
        Ok(handle)
    }

    /// Replace the options, re-creating the channel if its derivation changed
    ///
    /// The previous channel is torn down before the new one opens. When the
    /// channel name stays the same, events still waiting on the old
    /// coordinator carry over to the new one. Options that fail to resolve
    /// are rejected and leave the current binding untouched. No-op after
    /// [`ScopeHandle::teardown`].
    pub fn update(&mut self, options: ScopeOptions) -> Result<()> {
        if self.torn_down {
            debug!("update after teardown ignored");
            return Ok(());
        }
        let plan = plan_channel(&self.kind, &options, &self.defaults)?;
        self.options = options;
        self.apply(plan)
    }

    /// Close the channel and cancel every timer. Idempotent.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.deactivate();
    }

    /// Invoke the refresh now if events are waiting
    pub fn flush(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.coordinator.flush())
    }

    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.plan.name.as_str())
    }

    pub fn policy(&self) -> Option<&DebouncePolicy> {
        self.active.as_ref().map(|active| &active.plan.policy)
    }

    pub fn status(&self) -> Option<ConnectionStatus> {
        self.active.as_ref().map(|active| active.channel.status())
    }

    pub fn stats(&self) -> Option<DebounceStats> {
        self.active.as_ref().map(|active| active.coordinator.stats())
    }

    fn apply(&mut self, plan: Option<ChannelPlan>) -> Result<()> {
        let carried = match (&self.active, &plan) {
            (Some(active), Some(plan)) if active.plan == *plan => return Ok(()),
            (Some(active), Some(plan)) if active.plan.name == plan.name => active.coordinator.pending_since(),
            _ => None,
        };

        self.deactivate();

        match plan {
            Some(plan) => {
                let active = self.activate(plan)?;
                if let Some(since) = carried {
                    debug!(channel = %active.plan.name, "pending events carried over");
                    active.coordinator.resume(since);
                }
                self.active = Some(active);
            }
            None => {
                debug!(scope = self.kind.label(), prefix = %self.options.channel_name_prefix, "scope inactive");
            }
        }
        Ok(())
    }

    fn activate(&self, plan: ChannelPlan) -> Result<ActiveScope> {
        let tap = MetricsTap::new(self.metrics.clone(), plan.name.clone(), plan.topics.len());
        let coordinator = DebounceCoordinator::with_metrics(plan.policy, self.callback.clone(), tap)?;
        let channel = self
            .manager
            .open(&plan.name, &plan.topics, Arc::new(coordinator.clone()), None)?;

        info!(
            scope = self.kind.label(),
            channel = %plan.name,
            tables = plan.topics.len(),
            debounce_ms = plan.policy.debounce.as_millis() as u64,
            "scope bound"
        );
        Ok(ActiveScope {
            plan,
            coordinator,
            channel,
        })
    }

    fn deactivate(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.channel.close();
            active.coordinator.close();
            debug!(channel = %active.plan.name, "scope unbound");
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("kind", &self.kind)
            .field("channel", &self.channel_name())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
