//! Lifecycle metrics.
//!
//! The proxy hands every lifecycle event to a [`MetricsSink`] before touching
//! its own state. [`UserMetrics`] is the stock sink: it times how long users
//! take to go from STARTING to UNLOCKED and from STOPPING to STOPPED, keeping
//! a bounded log of finished sessions for `dump`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::types::{LifecycleEvent, LifecycleStage, UserId};

pub trait MetricsSink: Send + Sync {
    /// Must not panic; failures are swallowed by the sink.
    fn record(&self, event: &LifecycleEvent);

    /// Lines appended to the proxy dump.
    fn report(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _event: &LifecycleEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRecord {
    pub user: UserId,
    pub starting_at: u64,
    pub switched_from: Option<UserId>,
    pub switching_at: Option<u64>,
    pub unlocking_at: Option<u64>,
    pub unlocked_at: Option<u64>,
}

impl StartRecord {
    fn new(user: UserId, starting_at: u64) -> Self {
        Self {
            user,
            starting_at,
            switched_from: None,
            switching_at: None,
            unlocking_at: None,
            unlocked_at: None,
        }
    }

    fn render(&self) -> String {
        let mut line = format!("user={} starting_at={}", self.user, self.starting_at);
        if let Some(at) = self.switching_at {
            let from = self.switched_from.unwrap_or(UserId::NULL);
            line.push_str(&format!(
                " switch(from={from})=+{}ms",
                at.saturating_sub(self.starting_at)
            ));
        }
        if let Some(at) = self.unlocking_at {
            line.push_str(&format!(" unlocking=+{}ms", at.saturating_sub(self.starting_at)));
        }
        if let Some(at) = self.unlocked_at {
            line.push_str(&format!(" unlocked=+{}ms", at.saturating_sub(self.starting_at)));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopRecord {
    pub user: UserId,
    pub stopping_at: u64,
    pub stopped_at: Option<u64>,
}

impl StopRecord {
    fn render(&self) -> String {
        let mut line = format!("user={} stopping_at={}", self.user, self.stopping_at);
        if let Some(at) = self.stopped_at {
            line.push_str(&format!(" stopped=+{}ms", at.saturating_sub(self.stopping_at)));
        }
        line
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    starting: BTreeMap<UserId, StartRecord>,
    stopping: BTreeMap<UserId, StopRecord>,
    started: VecDeque<StartRecord>,
    stopped: VecDeque<StopRecord>,
    counts: BTreeMap<LifecycleStage, u64>,
}

pub struct UserMetrics {
    capacity: usize,
    state: Mutex<MetricsState>,
}

impl UserMetrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(MetricsState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MetricsState> {
        // Each update completes before the guard drops; poisoning leaves no torn state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self, stage: LifecycleStage) -> u64 {
        self.state().counts.get(&stage).copied().unwrap_or(0)
    }

    /// Finished start records, oldest first.
    pub fn completed_starts(&self) -> Vec<StartRecord> {
        self.state().started.iter().cloned().collect()
    }

    /// Finished stop records, oldest first.
    pub fn completed_stops(&self) -> Vec<StopRecord> {
        self.state().stopped.iter().cloned().collect()
    }

    pub fn in_progress_start(&self, user: UserId) -> Option<StartRecord> {
        self.state().starting.get(&user).cloned()
    }

    fn push_bounded<T>(capacity: usize, log: &mut VecDeque<T>, item: T) {
        if capacity == 0 {
            return;
        }
        while log.len() >= capacity {
            log.pop_front();
        }
        log.push_back(item);
    }
}

impl MetricsSink for UserMetrics {
    fn record(&self, event: &LifecycleEvent) {
        let capacity = self.capacity;
        let mut state = self.state();
        *state.counts.entry(event.stage).or_default() += 1;

        let user = event.to;
        let at = event.timestamp_ms;
        match event.stage {
            LifecycleStage::Starting => {
                state.starting.insert(user, StartRecord::new(user, at));
            }
            LifecycleStage::Switching => {
                if let Some(record) = state.starting.get_mut(&user) {
                    record.switched_from = Some(event.from);
                    record.switching_at = Some(at);
                }
            }
            LifecycleStage::Unlocking => {
                if let Some(record) = state.starting.get_mut(&user) {
                    record.unlocking_at = Some(at);
                }
            }
            LifecycleStage::Unlocked => {
                if let Some(mut record) = state.starting.remove(&user) {
                    record.unlocked_at = Some(at);
                    Self::push_bounded(capacity, &mut state.started, record);
                }
            }
            LifecycleStage::Stopping => {
                state.starting.remove(&user);
                state.stopping.insert(
                    user,
                    StopRecord {
                        user,
                        stopping_at: at,
                        stopped_at: None,
                    },
                );
            }
            LifecycleStage::Stopped => {
                state.starting.remove(&user);
                if let Some(mut record) = state.stopping.remove(&user) {
                    record.stopped_at = Some(at);
                    Self::push_bounded(capacity, &mut state.stopped, record);
                }
            }
        }
    }

    fn report(&self) -> Vec<String> {
        let state = self.state();
        let mut lines = Vec::new();

        let counts = LifecycleStage::ALL
            .iter()
            .map(|stage| format!("{stage}={}", state.counts.get(stage).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("event counts: {counts}"));

        if !state.starting.is_empty() {
            lines.push("users starting:".into());
            lines.extend(state.starting.values().map(|r| format!("  {}", r.render())));
        }
        if !state.stopping.is_empty() {
            lines.push("users stopping:".into());
            lines.extend(state.stopping.values().map(|r| format!("  {}", r.render())));
        }
        lines.push(format!("last {} started users:", state.started.len()));
        lines.extend(state.started.iter().map(|r| format!("  {}", r.render())));
        lines.push(format!("last {} stopped users:", state.stopped.len()));
        lines.extend(state.stopped.iter().map(|r| format!("  {}", r.render())));
        lines
    }
}
