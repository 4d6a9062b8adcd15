//! Recording fakes for driving a [`ConnectionProxy`](crate::ConnectionProxy)
//! without a real transport.
//!
//! - [`RecordingRemote`]: records every delivered call; can be told to fail
//!   upcoming calls.
//! - [`RecordingSupervisor`]: counts crash notifications.
//! - [`RecordingMetrics`]: keeps every event handed to the metrics sink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::metrics::MetricsSink;
use crate::remote::{RemoteEndpoint, RemoteHandle, TransportError};
use crate::supervisor::Supervisor;
use crate::types::{LifecycleEvent, LifecycleStage, UserId};

/// A delivered one-way call, without its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    Lifecycle {
        stage: LifecycleStage,
        from: UserId,
        to: UserId,
    },
    InitBootUser,
    PreCreateUsers,
}

impl RemoteCall {
    pub fn lifecycle(stage: LifecycleStage, from: i32, to: i32) -> Self {
        RemoteCall::Lifecycle {
            stage,
            from: UserId(from),
            to: UserId(to),
        }
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    /// Upcoming calls that fail, one each.
    fail_next: usize,
    /// Fail every call once this many calls have been delivered.
    fail_after: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RecordingRemote {
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<FailurePlan>,
    failed: AtomicUsize,
}

impl RecordingRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The same endpoint as a proxy-facing handle.
    pub fn handle(self: &Arc<Self>) -> RemoteHandle {
        self.clone()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.lock().unwrap().fail_next += count;
    }

    pub fn fail_after(&self, delivered: usize) {
        self.failures.lock().unwrap().fail_after = Some(delivered);
    }

    pub fn recover(&self) {
        *self.failures.lock().unwrap() = FailurePlan::default();
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<RemoteCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn count(&self, call: RemoteCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn failed_calls(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn deliver(&self, call: RemoteCall) -> Result<(), TransportError> {
        let mut calls = self.calls.lock().unwrap();
        let mut failures = self.failures.lock().unwrap();
        let exhausted = failures
            .fail_after
            .is_some_and(|limit| calls.len() >= limit);
        if failures.fail_next > 0 || exhausted {
            failures.fail_next = failures.fail_next.saturating_sub(1);
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::DeadObject);
        }
        calls.push(call);
        Ok(())
    }
}

impl RemoteEndpoint for RecordingRemote {
    fn notify_lifecycle_event(
        &self,
        stage: LifecycleStage,
        _timestamp_ms: u64,
        from: UserId,
        to: UserId,
    ) -> Result<(), TransportError> {
        self.deliver(RemoteCall::Lifecycle { stage, from, to })
    }

    fn init_boot_user(&self) -> Result<(), TransportError> {
        self.deliver(RemoteCall::InitBootUser)
    }

    fn pre_create_users(&self) -> Result<(), TransportError> {
        self.deliver(RemoteCall::PreCreateUsers)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    crashes: AtomicUsize,
}

impl RecordingSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn crashes(&self) -> usize {
        self.crashes.load(Ordering::SeqCst)
    }
}

impl Supervisor for RecordingSupervisor {
    fn on_remote_crashed(&self) {
        self.crashes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(*event);
    }

    fn report(&self) -> Vec<String> {
        vec![format!("recorded events: {}", self.events.lock().unwrap().len())]
    }
}

/// Fixed clock for deterministic timestamps.
pub fn fixed_clock() -> u64 {
    1_000
}
