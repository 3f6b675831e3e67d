//! Common utilities for integration tests

use parking_lot::Mutex;
use ripple_realtime::{EventKind, MemoryTransport, Realtime, RealtimeConfig, RefreshFn, RowChange};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Facade over a fresh in-memory transport
pub fn realtime() -> (Realtime, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let realtime = Realtime::new(transport.clone(), RealtimeConfig::default());
    (realtime, transport)
}

/// A row in `table` belonging to workspace `workspace_id`
pub fn workspace_row(table: &str, workspace_id: &str) -> RowChange {
    RowChange::new(table, EventKind::Update, json!({ "id": 1, "workspace_id": workspace_id }))
}

/// Refresh callback that records when it fired, relative to creation
#[derive(Clone)]
pub struct Recorder {
    start: Instant,
    fired: Arc<Mutex<Vec<Duration>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            fired: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn refresh(&self) -> RefreshFn {
        let recorder = self.clone();
        RefreshFn::new(move || recorder.fired.lock().push(recorder.start.elapsed()))
    }

    pub fn count(&self) -> usize {
        self.fired.lock().len()
    }

    pub fn times(&self) -> Vec<Duration> {
        self.fired.lock().clone()
    }
}

#[allow(dead_code)]
pub fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected { actual - expected } else { expected - actual };
    assert!(diff <= ms(1), "expected ~{:?}, got {:?}", expected, actual);
}
