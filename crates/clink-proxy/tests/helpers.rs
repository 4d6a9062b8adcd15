//! Shared fixtures for proxy integration tests.
//!
//! Each integration test compiles this module separately, so some helpers may
//! look unused in a given test binary.

#![allow(dead_code)]

use std::sync::Arc;

use clink_proxy::mock::{RecordingMetrics, RecordingRemote, RecordingSupervisor, fixed_clock};
use clink_proxy::{ConnectionProxy, LifecycleStage, ProxyConfig, UserId};

pub const NULL: i32 = UserId::NULL.0;
pub const SYS: i32 = UserId::SYSTEM.0;

pub struct Harness {
    pub proxy: ConnectionProxy,
    pub supervisor: Arc<RecordingSupervisor>,
    pub metrics: Arc<RecordingMetrics>,
}

impl Harness {
    pub fn new() -> Self {
        let supervisor = RecordingSupervisor::new();
        let metrics = RecordingMetrics::new();
        let proxy = ConnectionProxy::new(
            &ProxyConfig::default(),
            supervisor.clone(),
            metrics.clone(),
        )
        .with_clock(fixed_clock);
        Self {
            proxy,
            supervisor,
            metrics,
        }
    }

    pub fn event(&self, stage: LifecycleStage, from: i32, to: i32) {
        self.proxy.record_lifecycle_event(stage, UserId(from), UserId(to));
    }

    pub fn connect(&self) -> Arc<RecordingRemote> {
        let remote = RecordingRemote::new();
        self.proxy.on_connected(remote.handle());
        remote
    }
}
