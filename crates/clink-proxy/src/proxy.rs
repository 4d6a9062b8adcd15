//! The connection proxy.
//!
//! One mutex guards the ledger, the pending actions and the connection state
//! together: replay must see `current_user`, the pending flags and the remote
//! handle as one consistent snapshot. Outbound one-way calls are made while
//! the lock is held so that live events and replay never interleave for a
//! user. The supervisor is notified of a crash only after the lock is
//! released.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::ProxyConfig;
use crate::connection::{ConnectionState, LinkStatus};
use crate::ledger::{LifecycleLedger, ReplayItem};
use crate::metrics::MetricsSink;
use crate::pending::PendingActionSet;
use crate::remote::{RemoteHandle, TransportError};
use crate::supervisor::Supervisor;
use crate::types::{ActionId, LifecycleEvent, LifecycleStage, UserId, now_wallclock_ms};

struct ProxyState {
    ledger: LifecycleLedger,
    pending: PendingActionSet,
    connection: ConnectionState,
}

/// Set when an outbound call failed while the lock was held. `notify` is
/// false if the proxy was already crashed.
#[derive(Debug, Clone, Copy)]
struct Crashed {
    notify: bool,
}

pub struct ConnectionProxy {
    state: Mutex<ProxyState>,
    supervisor: Arc<dyn Supervisor>,
    metrics: Arc<dyn MetricsSink>,
    clock: fn() -> u64,
}

impl ConnectionProxy {
    pub fn new(
        config: &ProxyConfig,
        supervisor: Arc<dyn Supervisor>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            state: Mutex::new(ProxyState {
                ledger: LifecycleLedger::new(config.system_user),
                pending: PendingActionSet::new(),
                connection: ConnectionState::new(),
            }),
            supervisor,
            metrics,
            clock: now_wallclock_ms,
        }
    }

    /// Replaces the wall clock used to timestamp outbound events.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ProxyState> {
        // Every critical section leaves the state consistent between calls,
        // so a poisoned lock is still safe to use.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, outcome: Result<(), Crashed>) {
        if let Err(Crashed { notify: true }) = outcome {
            self.supervisor.on_remote_crashed();
        }
    }

    /// A companion endpoint became available. Flushes pending actions, then
    /// replays the ledger. A duplicate notification for the stored handle is
    /// ignored.
    pub fn on_connected(&self, remote: RemoteHandle) {
        let outcome = {
            let mut state = self.lock();
            if state.connection.is_current(&remote) {
                tracing::debug!("duplicate connection notification ignored");
                return;
            }
            let was = state.connection.status();
            state.connection.connect(remote.clone());
            tracing::info!(previous = ?was, "companion connected");
            self.catch_up(&mut state, &remote)
        };
        self.finish(outcome);
    }

    fn catch_up(&self, state: &mut ProxyState, remote: &RemoteHandle) -> Result<(), Crashed> {
        for action in state.pending.snapshot() {
            match run_action(remote, action) {
                Ok(()) => {
                    tracing::debug!(%action, "pending action delivered");
                    state.pending.clear(action);
                }
                Err(err) => return Err(crash(state, &err, "pending action")),
            }
        }

        let plan = state.ledger.replay_plan();
        for (index, item) in plan.iter().enumerate() {
            if let Err(err) = self.send_replay(remote, item) {
                tracing::warn!(
                    "replay aborted after {} of {} event(s)",
                    index,
                    plan.len()
                );
                return Err(crash(state, &err, "replay"));
            }
        }
        tracing::info!("replayed {} lifecycle event(s)", plan.len());
        Ok(())
    }

    fn send_replay(&self, remote: &RemoteHandle, item: &ReplayItem) -> Result<(), TransportError> {
        tracing::debug!(stage = %item.stage, from = %item.from, to = %item.to, "replay");
        remote.notify_lifecycle_event(item.stage, (self.clock)(), item.from, item.to)
    }

    /// Records a lifecycle transition and forwards it if connected.
    ///
    /// Every call is forwarded live, including ones the ledger ignores as
    /// regressions; only replay reflects the ledger's deduplicated view.
    pub fn record_lifecycle_event(&self, stage: LifecycleStage, from: UserId, to: UserId) {
        let event = LifecycleEvent {
            stage,
            timestamp_ms: (self.clock)(),
            from,
            to,
        };
        let metrics = &self.metrics;
        if catch_unwind(AssertUnwindSafe(|| metrics.record(&event))).is_err() {
            tracing::warn!(%event, "metrics sink panicked; event not recorded");
        }

        let outcome = {
            let mut state = self.lock();
            let update = state.ledger.record(stage, from, to);
            tracing::debug!(%event, ?update, "lifecycle event recorded");
            let remote = state.connection.remote().cloned();
            match remote {
                Some(remote) => remote
                    .notify_lifecycle_event(stage, event.timestamp_ms, from, to)
                    .map_err(|err| crash(&mut state, &err, "lifecycle event")),
                None => {
                    tracing::debug!(%event, "not connected; left for replay");
                    Ok(())
                }
            }
        };
        self.finish(outcome);
    }

    /// Runs `action` now if connected, otherwise keeps it pending until the
    /// next connection. The action stays pending until a call returns `Ok`.
    pub fn save_or_run(&self, action: ActionId) {
        let outcome = {
            let mut state = self.lock();
            state.pending.mark(action);
            let remote = state.connection.remote().cloned();
            match remote {
                Some(remote) => match run_action(&remote, action) {
                    Ok(()) => {
                        tracing::debug!(%action, "action delivered");
                        state.pending.clear(action);
                        Ok(())
                    }
                    Err(err) => Err(crash(&mut state, &err, "action")),
                },
                None if state.connection.is_crashed() => {
                    tracing::warn!(%action, "companion crashed; action deferred until reconnect");
                    Ok(())
                }
                None => {
                    tracing::debug!(%action, "not connected yet; action deferred");
                    Ok(())
                }
            }
        };
        self.finish(outcome);
    }

    /// Marks the companion as crashed and tells the supervisor. No-op if
    /// already crashed. Ledger and pending actions are kept for replay.
    pub fn on_crash(&self) {
        let notify = {
            let mut state = self.lock();
            let newly = state.connection.mark_crashed();
            if newly {
                tracing::warn!("companion marked crashed");
            }
            newly
        };
        if notify {
            self.supervisor.on_remote_crashed();
        }
    }

    pub fn link_status(&self) -> LinkStatus {
        self.lock().connection.status()
    }

    pub fn is_pending(&self, action: ActionId) -> bool {
        self.lock().pending.is_pending(action)
    }

    pub fn stage_of(&self, user: UserId) -> Option<LifecycleStage> {
        self.lock().ledger.stage_of(user)
    }

    pub fn current_user(&self) -> UserId {
        self.lock().ledger.current_user()
    }

    /// Read-only diagnostic snapshot.
    pub fn dump(&self) -> ProxyDump {
        let mut dump = {
            let state = self.lock();
            let ledger = &state.ledger;
            ProxyDump {
                status: state.connection.status(),
                system_user: ledger.system_user(),
                system_user_stage: ledger.stage_of(ledger.system_user()),
                current_user: ledger.current_user(),
                current_user_stage: ledger.stage_of(ledger.current_user()),
                previous_user: ledger.previous_user(),
                running_users: ledger.len(),
                pending: state.pending.snapshot(),
                metrics: Vec::new(),
            }
        };
        dump.metrics = self.metrics.report();
        dump
    }
}

impl fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionProxy")
            .field("ledger", &state.ledger)
            .field("pending", &state.pending)
            .field("connection", &state.connection)
            .finish()
    }
}

fn run_action(remote: &RemoteHandle, action: ActionId) -> Result<(), TransportError> {
    match action {
        ActionId::InitBootUser => remote.init_boot_user(),
        ActionId::PreCreateUsers => remote.pre_create_users(),
    }
}

fn crash(state: &mut ProxyState, err: &TransportError, during: &str) -> Crashed {
    let notify = state.connection.mark_crashed();
    tracing::warn!(error = %err, "companion call failed during {during}; marked crashed");
    Crashed { notify }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyDump {
    pub status: LinkStatus,
    pub system_user: UserId,
    pub system_user_stage: Option<LifecycleStage>,
    pub current_user: UserId,
    pub current_user_stage: Option<LifecycleStage>,
    pub previous_user: UserId,
    pub running_users: usize,
    pub pending: Vec<ActionId>,
    pub metrics: Vec<String>,
}

impl fmt::Display for ProxyDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn stage(stage: Option<LifecycleStage>) -> &'static str {
            stage.map(LifecycleStage::as_str).unwrap_or("none")
        }

        writeln!(f, "ConnectionProxy")?;
        writeln!(f, "  status: {:?}", self.status)?;
        writeln!(
            f,
            "  system user: {} (stage: {})",
            self.system_user,
            stage(self.system_user_stage)
        )?;
        writeln!(
            f,
            "  current user: {} (stage: {}, switched from: {})",
            self.current_user,
            stage(self.current_user_stage),
            self.previous_user
        )?;
        writeln!(f, "  running users: {}", self.running_users)?;
        let pending = if self.pending.is_empty() {
            "none".to_string()
        } else {
            self.pending
                .iter()
                .map(|action| action.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(f, "  pending actions: {pending}")?;
        if !self.metrics.is_empty() {
            writeln!(f, "  metrics:")?;
            for line in &self.metrics {
                writeln!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::mock::RecordingRemote;
    use crate::supervisor::NoopSupervisor;

    fn proxy() -> ConnectionProxy {
        ConnectionProxy::new(
            &ProxyConfig::default(),
            Arc::new(NoopSupervisor),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn starts_never_connected_with_system_user_current() {
        let proxy = proxy();
        assert_eq!(proxy.link_status(), LinkStatus::NeverConnected);
        assert_eq!(proxy.current_user(), UserId::SYSTEM);
        let dump = proxy.dump();
        assert!(dump.metrics.is_empty());
        assert_eq!(dump.running_users, 0);
        assert!(dump.to_string().contains("pending actions: none"));
    }

    #[test]
    fn crash_before_any_connection_defers_actions() {
        let proxy = proxy();
        proxy.on_crash();
        assert_eq!(proxy.link_status(), LinkStatus::Crashed);
        proxy.save_or_run(ActionId::InitBootUser);
        assert!(proxy.is_pending(ActionId::InitBootUser));
    }

    #[test]
    fn dump_lists_pending_actions_by_name() {
        let proxy = proxy();
        proxy.save_or_run(ActionId::PreCreateUsers);
        proxy.save_or_run(ActionId::InitBootUser);
        let text = proxy.dump().to_string();
        assert!(text.starts_with("ConnectionProxy\n"));
        assert!(text.contains("  pending actions: init_boot_user, pre_create_users\n"));
    }

    #[test]
    fn custom_system_user_is_replayed_first() {
        let config = ProxyConfig {
            system_user: UserId(10),
            ..ProxyConfig::default()
        };
        let proxy = ConnectionProxy::new(&config, Arc::new(NoopSupervisor), Arc::new(NoopMetrics))
            .with_clock(crate::mock::fixed_clock);
        proxy.record_lifecycle_event(LifecycleStage::Starting, UserId::NULL, UserId(0));
        proxy.record_lifecycle_event(LifecycleStage::Starting, UserId::NULL, UserId(10));

        let remote = RecordingRemote::new();
        proxy.on_connected(remote.handle());

        let order: Vec<_> = remote
            .calls()
            .into_iter()
            .map(|call| match call {
                crate::mock::RemoteCall::Lifecycle { to, .. } => to.0,
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![10, 0]);
        assert!(format!("{proxy:?}").contains("connected: true"));
    }
}
