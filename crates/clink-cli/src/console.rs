use std::sync::atomic::{AtomicUsize, Ordering};

use clink_proxy::{LifecycleStage, RemoteEndpoint, TransportError, UserId};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Prints one transcript record. `text` is used for `Text`, `value` for `Json`.
    pub fn emit(self, text: impl FnOnce() -> String, value: impl FnOnce() -> serde_json::Value) {
        match self {
            OutputFormat::Text => println!("{}", text()),
            OutputFormat::Json => println!("{}", value()),
        }
    }
}

/// Companion endpoint that prints each call it receives.
pub struct ConsoleRemote {
    id: usize,
    format: OutputFormat,
    fail_next: AtomicUsize,
}

impl ConsoleRemote {
    pub fn new(id: usize, format: OutputFormat) -> Self {
        Self {
            id,
            format,
            fail_next: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.fetch_add(1, Ordering::SeqCst);
    }

    fn deliver(
        &self,
        call: &str,
        text: String,
        value: serde_json::Value,
    ) -> Result<(), TransportError> {
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.format.emit(
                || format!("remote#{} {call} FAILED", self.id),
                || json!({"remote": self.id, "call": call, "failed": true}),
            );
            return Err(TransportError::Failed(format!(
                "injected failure on remote#{}",
                self.id
            )));
        }
        let mut value = value;
        value["remote"] = json!(self.id);
        value["call"] = json!(call);
        self.format.emit(|| format!("remote#{} {call}{text}", self.id), || value);
        Ok(())
    }
}

impl RemoteEndpoint for ConsoleRemote {
    fn notify_lifecycle_event(
        &self,
        stage: LifecycleStage,
        timestamp_ms: u64,
        from: UserId,
        to: UserId,
    ) -> Result<(), TransportError> {
        self.deliver(
            "lifecycle",
            format!(" {stage} {from} -> {to}"),
            json!({"stage": stage, "from": from, "to": to, "timestamp_ms": timestamp_ms}),
        )
    }

    fn init_boot_user(&self) -> Result<(), TransportError> {
        self.deliver("init_boot_user", String::new(), json!({}))
    }

    fn pre_create_users(&self) -> Result<(), TransportError> {
        self.deliver("pre_create_users", String::new(), json!({}))
    }
}
