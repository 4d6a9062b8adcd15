use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use clap::ValueEnum;
use clink_proxy::Supervisor;
use serde_json::json;

use crate::console::OutputFormat;

/// What the script supervisor does when the companion crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CrashPolicy {
    /// Keep running and wait for the next connect.
    Continue,
    /// Stop the run with a failure, like a supervisor that restarts itself.
    Abort,
}

pub struct ScriptSupervisor {
    policy: CrashPolicy,
    format: OutputFormat,
    crashes: AtomicUsize,
    abort: AtomicBool,
}

impl ScriptSupervisor {
    pub fn new(policy: CrashPolicy, format: OutputFormat) -> Self {
        Self {
            policy,
            format,
            crashes: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
        }
    }

    pub fn crashes(&self) -> usize {
        self.crashes.load(Ordering::SeqCst)
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl Supervisor for ScriptSupervisor {
    fn on_remote_crashed(&self) {
        let count = self.crashes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(policy = ?self.policy, "companion crashed ({count} so far)");
        self.format.emit(
            || format!("supervisor crashed count={count}"),
            || json!({"supervisor": "crashed", "count": count}),
        );
        if self.policy == CrashPolicy::Abort {
            self.abort.store(true, Ordering::SeqCst);
        }
    }
}
