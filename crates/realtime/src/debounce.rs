//! Leading/trailing/max-wait debouncing of change signals
//!
//! One coordinator per channel. Every raw event calls [`DebounceCoordinator::notify`];
//! the coordinator collapses them into a bounded number of callback invocations.
//! The callback is a cue to re-derive state, never a per-event record.
//!
//! Timers are tokio tasks. A timer only fires if its id still occupies its
//! slot when it wakes, so cancelling is a matter of clearing the slot (which
//! also aborts the task).

use parking_lot::Mutex;
use ripple_core::{DebouncePolicy, MetricsRegistry, RealtimeError, Result};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Refresh callback invoked by the coordinator
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Reports observed delays for one channel to a [`MetricsRegistry`]
#[derive(Debug, Clone)]
pub struct MetricsTap {
    registry: MetricsRegistry,
    channel_name: String,
    subscription_count: usize,
}

impl MetricsTap {
    pub fn new(registry: MetricsRegistry, channel_name: impl Into<String>, subscription_count: usize) -> Self {
        Self {
            registry,
            channel_name: channel_name.into(),
            subscription_count,
        }
    }

    fn record(&self, delay: Duration) {
        self.registry
            .record_with_subscriptions(&self.channel_name, self.subscription_count, delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Trailing,
    MaxWait,
}

/// An armed timer; dropping it aborts the task
struct PendingTimer {
    id: u64,
    deadline: Instant,
    task: Option<JoinHandle<()>>,
}

impl PendingTimer {
    /// Release the slot without aborting (used by the firing task itself)
    fn disarm(mut self) {
        self.task.take();
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct DebounceState {
    /// At most one pending trailing timer
    trailing: Option<PendingTimer>,
    max_wait: Option<PendingTimer>,
    last_invocation: Option<Instant>,
    last_event: Option<Instant>,
    /// First event of the current unbroken burst
    burst_start: Option<Instant>,
    /// First event not yet covered by an invocation
    pending_since: Option<Instant>,
    invocation_count: u64,
    next_timer_id: u64,
    closed: bool,
}

impl DebounceState {
    fn cancel_timers(&mut self) {
        self.trailing = None;
        self.max_wait = None;
    }

    /// Bookkeeping for an invocation at `now`; returns the observed delay
    fn mark_invoked(&mut self, now: Instant) -> Duration {
        // Every event so far is covered by this invocation
        self.cancel_timers();
        self.last_invocation = Some(now);
        self.invocation_count += 1;
        self.pending_since
            .take()
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO)
    }
}

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceStats {
    pub invocation_count: u64,
    pub last_invocation: Option<Instant>,
    /// Earliest armed deadline, if any timer is pending
    pub next_fire: Option<Instant>,
    pub closed: bool,
}

struct Inner {
    policy: DebouncePolicy,
    callback: Callback,
    runtime: Handle,
    metrics: Option<MetricsTap>,
    state: Mutex<DebounceState>,
}

/// Debounce coordinator
///
/// Clones share the same state. Dropping the last clone aborts any armed
/// timer.
#[derive(Clone)]
pub struct DebounceCoordinator {
    inner: Arc<Inner>,
}

impl DebounceCoordinator {
    /// Create a coordinator scheduling timers on the current tokio runtime
    pub fn new(policy: DebouncePolicy, callback: Callback) -> Result<Self> {
        Self::build(policy, callback, None)
    }

    /// Same as [`DebounceCoordinator::new`], reporting delays to `metrics`
    pub fn with_metrics(policy: DebouncePolicy, callback: Callback, metrics: MetricsTap) -> Result<Self> {
        Self::build(policy, callback, Some(metrics))
    }

    fn build(policy: DebouncePolicy, callback: Callback, metrics: Option<MetricsTap>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
        let policy = policy.normalized();
        policy.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                policy,
                callback,
                runtime,
                metrics,
                state: Mutex::new(DebounceState::default()),
            }),
        })
    }

    pub fn policy(&self) -> &DebouncePolicy {
        &self.inner.policy
    }

    /// Signal that one raw event arrived. Never blocks.
    pub fn notify(&self) {
        let now = Instant::now();
        let policy = &self.inner.policy;

        let leading_delay = {
            let mut state = self.inner.state.lock();
            if state.closed {
                trace!("notify after close ignored");
                return;
            }

            let continues_burst = state
                .last_event
                .map_or(false, |last| now.saturating_duration_since(last) < policy.debounce);
            if !continues_burst {
                state.burst_start = Some(now);
            }
            state.last_event = Some(now);

            // Re-arming below replaces it; leading fire makes it moot
            state.trailing = None;

            let idle = state
                .last_invocation
                .map_or(true, |last| now.saturating_duration_since(last) > policy.debounce);

            if policy.leading && idle {
                // Leading fires are immediate; events dropped earlier by a
                // trailing-less policy are not part of its delay
                state.pending_since = None;
                Some(state.mark_invoked(now))
            } else {
                state.pending_since.get_or_insert(now);

                if policy.trailing {
                    let timer = self.arm(&mut state, TimerKind::Trailing, now + policy.debounce);
                    state.trailing = Some(timer);
                }

                if let Some(max_wait) = policy.max_wait {
                    if state.max_wait.is_none() {
                        let burst_start = state.burst_start.unwrap_or(now);
                        let anchor = state
                            .last_invocation
                            .map_or(burst_start, |last| last.max(burst_start));
                        let timer = self.arm(&mut state, TimerKind::MaxWait, anchor + max_wait);
                        state.max_wait = Some(timer);
                    }
                }
                None
            }
        };

        if let Some(delay) = leading_delay {
            debug!("leading-edge fire");
            self.invoke(delay);
        }
    }

    /// Drop armed timers and pending events; the coordinator stays usable
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.cancel_timers();
        state.pending_since = None;
    }

    /// Cancel everything and ignore all later notifies. Idempotent.
    ///
    /// Once this returns no callback will be invoked by a timer.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.cancel_timers();
        state.pending_since = None;
        debug!(invocations = state.invocation_count, "debounce coordinator closed");
    }

    /// Invoke now if an event is waiting; returns whether it fired
    pub fn flush(&self) -> bool {
        let delay = {
            let mut state = self.inner.state.lock();
            if state.closed || state.pending_since.is_none() {
                return false;
            }
            state.mark_invoked(Instant::now())
        };

        debug!("flushed pending events");
        self.invoke(delay);
        true
    }

    /// First event a timer still owes an invocation for
    pub fn pending_since(&self) -> Option<Instant> {
        let state = self.inner.state.lock();
        if state.closed || (state.trailing.is_none() && state.max_wait.is_none()) {
            return None;
        }
        state.pending_since
    }

    /// Take over events first seen at `since` by a coordinator this one replaces
    ///
    /// Arms timers as if a burst began at `since` and its latest event is now.
    /// Never a leading fire; a policy with neither trailing nor max-wait
    /// invokes immediately so the owed refresh is not lost.
    pub fn resume(&self, since: Instant) {
        let now = Instant::now();
        let policy = &self.inner.policy;

        let immediate = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }

            state.burst_start = Some(since);
            state.last_event = Some(now);
            state.pending_since = Some(since);

            if !policy.trailing && policy.max_wait.is_none() {
                Some(state.mark_invoked(now))
            } else {
                if policy.trailing {
                    let timer = self.arm(&mut state, TimerKind::Trailing, now + policy.debounce);
                    state.trailing = Some(timer);
                }
                if let Some(max_wait) = policy.max_wait {
                    let timer = self.arm(&mut state, TimerKind::MaxWait, since + max_wait);
                    state.max_wait = Some(timer);
                }
                None
            }
        };

        if let Some(delay) = immediate {
            debug!("resumed pending events fired");
            self.invoke(delay);
        }
    }

    /// Whether a trailing or max-wait timer is armed
    pub fn is_pending(&self) -> bool {
        let state = self.inner.state.lock();
        state.trailing.is_some() || state.max_wait.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn stats(&self) -> DebounceStats {
        let state = self.inner.state.lock();
        let next_fire = [&state.trailing, &state.max_wait]
            .into_iter()
            .flatten()
            .map(|timer| timer.deadline)
            .min();

        DebounceStats {
            invocation_count: state.invocation_count,
            last_invocation: state.last_invocation,
            next_fire,
            closed: state.closed,
        }
    }

    fn arm(&self, state: &mut DebounceState, kind: TimerKind, deadline: Instant) -> PendingTimer {
        state.next_timer_id += 1;
        let id = state.next_timer_id;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                DebounceCoordinator { inner }.fire(kind, id);
            }
        });

        trace!(?kind, id, "timer armed");
        PendingTimer {
            id,
            deadline,
            task: Some(task),
        }
    }

    fn fire(&self, kind: TimerKind, id: u64) {
        let now = Instant::now();

        let delay = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }

            let slot = match kind {
                TimerKind::Trailing => &mut state.trailing,
                TimerKind::MaxWait => &mut state.max_wait,
            };
            match slot.take() {
                Some(timer) if timer.id == id => timer.disarm(),
                other => {
                    // Superseded by a re-arm or cancel
                    *slot = other;
                    trace!(?kind, id, "stale timer wakeup ignored");
                    return;
                }
            }

            state.mark_invoked(now)
        };

        debug!(?kind, delay_ms = delay.as_millis() as u64, "debounce fired");
        self.invoke(delay);
    }

    fn invoke(&self, delay: Duration) {
        (self.inner.callback)();
        if let Some(metrics) = &self.inner.metrics {
            metrics.record(delay);
        }
    }
}

impl std::fmt::Debug for DebounceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceCoordinator")
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Callback that records elapsed time since `start` on every fire
    fn recorder(start: Instant) -> (Callback, Arc<Mutex<Vec<Duration>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let callback: Callback = Arc::new(move || sink.lock().push(start.elapsed()));
        (callback, fired)
    }

    fn assert_near(actual: Duration, expected: Duration) {
        let diff = if actual > expected { actual - expected } else { expected - actual };
        assert!(diff <= ms(1), "expected ~{:?}, got {:?}", expected, actual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_only_fires_once_after_quiet_period() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(500)), callback).unwrap();

        coordinator.notify();
        sleep(ms(100)).await;
        coordinator.notify();
        sleep(ms(100)).await;
        coordinator.notify();

        sleep(ms(2000)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        assert_near(fired[0], ms(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_fires_immediately_when_idle() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(500)).with_leading(true);
        let coordinator = DebounceCoordinator::new(policy, callback).unwrap();

        coordinator.notify();
        assert_eq!(fired.lock().as_slice(), &[Duration::ZERO]);

        // A lone leading event does not also produce a trailing fire
        sleep(ms(2000)).await;
        assert_eq!(fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_then_trailing_for_followups() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(500)).with_leading(true);
        let coordinator = DebounceCoordinator::new(policy, callback).unwrap();

        coordinator.notify();
        sleep(ms(100)).await;
        coordinator.notify();
        sleep(ms(2000)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 2);
        assert_near(fired[0], ms(0));
        assert_near(fired[1], ms(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_bounds_continuous_burst() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(200)).with_max_wait(Some(ms(600)));
        let coordinator = DebounceCoordinator::new(policy, callback).unwrap();

        while start.elapsed() < ms(2000) {
            coordinator.notify();
            sleep(ms(150)).await;
        }
        sleep(ms(1000)).await;

        let fired = fired.lock();
        assert!(fired.len() >= 3, "only {} callbacks", fired.len());
        // Timer wheel resolution is 1ms
        assert!(fired[0] <= ms(601));
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] <= ms(601), "gap {:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_only_policy() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(100))
            .with_trailing(false)
            .with_max_wait(Some(ms(300)));
        let coordinator = DebounceCoordinator::new(policy, callback).unwrap();

        coordinator.notify();
        sleep(ms(1000)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        assert_near(fired[0], ms(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_fire_cancels_max_wait() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(100)).with_max_wait(Some(ms(1000)));
        let coordinator = DebounceCoordinator::new(policy, callback).unwrap();

        coordinator.notify();
        sleep(ms(3000)).await;

        // Only the trailing fire; the max-wait timer went with it
        assert_eq!(fired.lock().len(), 1);
        assert!(!coordinator.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_prevents_pending_fire() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(500)), callback).unwrap();

        coordinator.notify();
        assert!(coordinator.is_pending());
        coordinator.close();
        assert!(!coordinator.is_pending());

        coordinator.notify();
        sleep(ms(2000)).await;

        assert!(fired.lock().is_empty());
        assert!(coordinator.stats().closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_coordinator_usable() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(200)), callback).unwrap();

        coordinator.notify();
        coordinator.cancel();
        sleep(ms(500)).await;
        assert!(fired.lock().is_empty());

        coordinator.notify();
        sleep(ms(500)).await;
        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        assert_near(fired[0], ms(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_fires_pending_immediately() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(500)), callback).unwrap();

        assert!(!coordinator.flush());

        coordinator.notify();
        sleep(ms(50)).await;
        assert!(coordinator.flush());
        assert!(!coordinator.is_pending());

        sleep(ms(2000)).await;
        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        assert_near(fired[0], ms(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_clone_aborts_timers() {
        let start = Instant::now();
        let (callback, fired) = recorder(start);
        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(100)), callback).unwrap();

        coordinator.notify();
        drop(coordinator);
        sleep(ms(500)).await;

        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_close_coordinator() {
        let slot: Arc<Mutex<Option<DebounceCoordinator>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(Mutex::new(0u32));

        let slot_cb = slot.clone();
        let count_cb = count.clone();
        let callback: Callback = Arc::new(move || {
            *count_cb.lock() += 1;
            if let Some(coordinator) = slot_cb.lock().as_ref() {
                coordinator.close();
            }
        });

        let coordinator = DebounceCoordinator::new(DebouncePolicy::trailing(ms(100)), callback).unwrap();
        *slot.lock() = Some(coordinator.clone());

        coordinator.notify();
        sleep(ms(500)).await;
        coordinator.notify();
        sleep(ms(500)).await;

        assert_eq!(*count.lock(), 1);
        assert!(coordinator.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_tap_records_delay() {
        let registry = MetricsRegistry::new();
        let tap = MetricsTap::new(registry.clone(), "tasks-ws-1", 2);
        let callback: Callback = Arc::new(|| {});
        let coordinator =
            DebounceCoordinator::with_metrics(DebouncePolicy::trailing(ms(500)), callback, tap).unwrap();

        coordinator.notify();
        sleep(ms(100)).await;
        coordinator.notify();
        sleep(ms(1000)).await;

        let record = registry.get("tasks-ws-1").unwrap();
        assert_eq!(record.update_count, 1);
        assert_eq!(record.subscription_count, 2);
        assert!((record.average_debounce_delay_ms - 600.0).abs() <= 1.0);
        assert_eq!(coordinator.stats().invocation_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_takes_over_pending_events() {
        let start = Instant::now();
        let (old_cb, old_fired) = recorder(start);
        let old = DebounceCoordinator::new(DebouncePolicy::trailing(ms(500)), old_cb).unwrap();
        assert_eq!(old.pending_since(), None);

        old.notify();
        sleep(ms(100)).await;
        let since = old.pending_since().unwrap();
        old.close();
        assert_eq!(old.pending_since(), None);

        let (new_cb, new_fired) = recorder(start);
        let policy = DebouncePolicy::trailing(ms(200)).with_max_wait(Some(ms(250)));
        let new = DebounceCoordinator::new(policy, new_cb).unwrap();
        new.resume(since);
        sleep(ms(1000)).await;

        // Max-wait counts from the original event, not from the hand-over
        assert!(old_fired.lock().is_empty());
        let fired = new_fired.lock().clone();
        assert_eq!(fired.len(), 1);
        assert_near(fired[0], ms(250));
    }

    #[test]
    fn test_requires_runtime() {
        let callback: Callback = Arc::new(|| {});
        let result = DebounceCoordinator::new(DebouncePolicy::trailing(ms(100)), callback);
        assert!(matches!(result, Err(RealtimeError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_inert_policy_rejected() {
        let callback: Callback = Arc::new(|| {});
        let policy = DebouncePolicy::trailing(ms(100)).with_trailing(false);
        let result = DebounceCoordinator::new(policy, callback);
        assert!(matches!(result, Err(RealtimeError::InvalidPolicy(_))));
    }
}
