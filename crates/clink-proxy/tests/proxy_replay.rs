mod helpers;

use clink_proxy::LifecycleStage::*;
use clink_proxy::connection::LinkStatus;
use clink_proxy::mock::{RecordingRemote, RemoteCall};
use clink_proxy::{LifecycleStage, UserId};
use helpers::{Harness, NULL, SYS};

fn lc(stage: LifecycleStage, from: i32, to: i32) -> RemoteCall {
    RemoteCall::lifecycle(stage, from, to)
}

#[test]
fn replay_catches_up_system_then_current_user() {
    let h = Harness::new();
    h.event(Starting, NULL, SYS);
    h.event(Unlocking, NULL, SYS);
    h.event(Unlocked, NULL, SYS);
    h.event(Starting, NULL, 42);
    h.event(Switching, 7, 42);
    h.event(Unlocking, NULL, 42);

    let remote = h.connect();

    assert_eq!(
        remote.calls(),
        vec![
            lc(Starting, NULL, SYS),
            lc(Unlocking, NULL, SYS),
            lc(Unlocked, NULL, SYS),
            lc(Starting, NULL, 42),
            lc(Switching, 7, 42),
            lc(Unlocking, NULL, 42),
        ]
    );
    assert_eq!(h.proxy.link_status(), LinkStatus::Connected);
}

#[test]
fn other_users_follow_current_user_in_id_order() {
    let h = Harness::new();
    h.event(Unlocked, NULL, SYS);
    h.event(Unlocked, NULL, 12);
    h.event(Starting, NULL, 11);
    h.event(Switching, SYS, 10);

    let remote = h.connect();

    assert_eq!(
        remote.calls(),
        vec![
            lc(Starting, NULL, SYS),
            lc(Unlocking, NULL, SYS),
            lc(Unlocked, NULL, SYS),
            lc(Starting, NULL, 10),
            lc(Switching, SYS, 10),
            lc(Starting, NULL, 11),
            lc(Starting, NULL, 12),
            lc(Unlocking, NULL, 12),
            lc(Unlocked, NULL, 12),
        ]
    );
}

#[test]
fn stopped_user_is_not_replayed() {
    let h = Harness::new();
    h.event(Starting, NULL, 99);
    h.event(Unlocked, NULL, 99);
    h.event(Stopped, NULL, 99);

    let remote = h.connect();

    assert!(remote.calls().is_empty(), "{:?}", remote.calls());
    assert_eq!(h.proxy.stage_of(UserId(99)), None);
}

#[test]
fn duplicate_connection_does_not_replay_twice() {
    let h = Harness::new();
    h.event(Unlocked, NULL, SYS);

    let remote = RecordingRemote::new();
    h.proxy.on_connected(remote.handle());
    h.proxy.on_connected(remote.handle());

    assert_eq!(remote.calls().len(), 3);
}

#[test]
fn switch_from_null_user_is_replayed() {
    let h = Harness::new();
    h.event(Switching, NULL, 5);

    let remote = h.connect();

    assert_eq!(
        remote.calls(),
        vec![lc(Starting, NULL, 5), lc(Switching, NULL, 5)]
    );
    assert_eq!(h.supervisor.crashes(), 0);
}

#[test]
fn live_events_are_forwarded_without_deduplication() {
    let h = Harness::new();
    let remote = h.connect();

    h.event(Unlocked, NULL, 10);
    h.event(Unlocking, NULL, 10);

    assert_eq!(
        remote.calls(),
        vec![lc(Unlocked, NULL, 10), lc(Unlocking, NULL, 10)]
    );
    assert_eq!(h.proxy.stage_of(UserId(10)), Some(Unlocked));

    // A later replay only reflects the furthest stage.
    let second = h.connect();
    assert_eq!(
        second.calls(),
        vec![
            lc(Starting, NULL, 10),
            lc(Unlocking, NULL, 10),
            lc(Unlocked, NULL, 10),
        ]
    );
}

#[test]
fn every_event_reaches_metrics_even_when_disconnected() {
    let h = Harness::new();
    h.event(Starting, NULL, 10);
    h.event(Stopping, NULL, 10);
    h.event(Stopped, NULL, 10);

    let stages: Vec<_> = h.metrics.events().iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![Starting, Stopping, Stopped]);
    assert!(h.metrics.events().iter().all(|e| e.timestamp_ms == 1_000));
}

#[test]
fn crash_mid_replay_is_replayed_in_full_on_reconnect() {
    let h = Harness::new();
    h.event(Unlocked, NULL, SYS);
    h.event(Switching, SYS, 10);
    h.event(Unlocked, NULL, 10);

    let flaky = RecordingRemote::new();
    flaky.fail_after(2);
    h.proxy.on_connected(flaky.handle());

    assert_eq!(
        flaky.calls(),
        vec![lc(Starting, NULL, SYS), lc(Unlocking, NULL, SYS)]
    );
    assert_eq!(flaky.failed_calls(), 1, "replay must stop at the first failure");
    assert_eq!(h.proxy.link_status(), LinkStatus::Crashed);
    assert_eq!(h.supervisor.crashes(), 1);

    let remote = h.connect();
    assert_eq!(
        remote.calls(),
        vec![
            lc(Starting, NULL, SYS),
            lc(Unlocking, NULL, SYS),
            lc(Unlocked, NULL, SYS),
            lc(Starting, NULL, 10),
            lc(Switching, SYS, 10),
            lc(Unlocking, NULL, 10),
            lc(Unlocked, NULL, 10),
        ]
    );
}

#[test]
fn failed_live_event_crashes_and_is_recovered_by_replay() {
    let h = Harness::new();
    let remote = h.connect();
    remote.fail_next(1);

    h.event(Starting, NULL, 10);
    assert_eq!(h.proxy.link_status(), LinkStatus::Crashed);
    assert_eq!(h.supervisor.crashes(), 1);

    // Events while crashed are ledgered but not sent.
    h.event(Unlocking, NULL, 10);
    assert!(remote.calls().is_empty());
    assert_eq!(h.supervisor.crashes(), 1);

    let next = h.connect();
    assert_eq!(
        next.calls(),
        vec![lc(Starting, NULL, 10), lc(Unlocking, NULL, 10)]
    );
}

#[test]
fn same_handle_reconnecting_after_crash_replays() {
    let h = Harness::new();
    h.event(Unlocked, NULL, SYS);
    let remote = h.connect();
    remote.take_calls();

    h.proxy.on_crash();
    h.proxy.on_connected(remote.handle());

    assert_eq!(remote.calls().len(), 3);
}

#[test]
fn on_crash_is_idempotent() {
    let h = Harness::new();
    let _remote = h.connect();

    h.proxy.on_crash();
    h.proxy.on_crash();

    assert_eq!(h.supervisor.crashes(), 1);
    assert_eq!(h.proxy.link_status(), LinkStatus::Crashed);
}

#[test]
fn dump_reports_users_and_metrics() {
    let h = Harness::new();
    h.event(Unlocked, NULL, SYS);
    h.event(Switching, SYS, 10);

    let dump = h.proxy.dump();
    assert_eq!(dump.current_user, UserId(10));
    assert_eq!(dump.current_user_stage, Some(Switching));
    assert_eq!(dump.system_user_stage, Some(Unlocked));
    assert_eq!(dump.previous_user, UserId::SYSTEM);
    assert_eq!(dump.status, LinkStatus::NeverConnected);

    let text = dump.to_string();
    assert!(text.contains("current user: 10 (stage: switching"), "{text}");
    assert!(text.contains("recorded events: 2"), "{text}");
}

#[test]
fn panicking_metrics_sink_does_not_break_delivery() {
    use std::sync::Arc;

    use clink_proxy::mock::{RecordingSupervisor, fixed_clock};
    use clink_proxy::{ConnectionProxy, LifecycleEvent, MetricsSink, ProxyConfig};

    struct Exploding;
    impl MetricsSink for Exploding {
        fn record(&self, _event: &LifecycleEvent) {
            panic!("sink failure");
        }
    }

    let proxy = ConnectionProxy::new(
        &ProxyConfig::default(),
        RecordingSupervisor::new(),
        Arc::new(Exploding),
    )
    .with_clock(fixed_clock);
    let remote = RecordingRemote::new();
    proxy.on_connected(remote.handle());

    proxy.record_lifecycle_event(Starting, UserId::NULL, UserId(3));

    assert_eq!(remote.calls(), vec![lc(Starting, NULL, 3)]);
    assert_eq!(proxy.stage_of(UserId(3)), Some(Starting));
}

#[test]
fn supervisor_may_inspect_proxy_when_notified() {
    use std::sync::{Arc, Mutex, OnceLock, Weak};

    use clink_proxy::mock::fixed_clock;
    use clink_proxy::{ConnectionProxy, NoopMetrics, ProxyConfig, Supervisor};

    #[derive(Default)]
    struct Inspecting {
        proxy: OnceLock<Weak<ConnectionProxy>>,
        seen: Mutex<Vec<LinkStatus>>,
    }
    impl Supervisor for Inspecting {
        fn on_remote_crashed(&self) {
            if let Some(proxy) = self.proxy.get().and_then(Weak::upgrade) {
                self.seen.lock().unwrap().push(proxy.dump().status);
            }
        }
    }

    let supervisor = Arc::new(Inspecting::default());
    let proxy = Arc::new(
        ConnectionProxy::new(
            &ProxyConfig::default(),
            supervisor.clone(),
            Arc::new(NoopMetrics),
        )
        .with_clock(fixed_clock),
    );
    supervisor.proxy.set(Arc::downgrade(&proxy)).unwrap();

    let remote = RecordingRemote::new();
    proxy.on_connected(remote.handle());
    remote.fail_next(1);
    proxy.record_lifecycle_event(Starting, UserId::NULL, UserId(4));
    proxy.on_crash();

    assert_eq!(*supervisor.seen.lock().unwrap(), vec![LinkStatus::Crashed]);
}
