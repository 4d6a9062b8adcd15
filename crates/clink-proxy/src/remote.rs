use std::sync::Arc;

use thiserror::Error;

use crate::types::{LifecycleStage, UserId};

/// Delivery failure of a one-way call. Any of these moves the proxy into the
/// crashed state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote endpoint disconnected")]
    Disconnected,
    #[error("remote endpoint process died")]
    DeadObject,
    #[error("transport failure: {0}")]
    Failed(String),
}

/// The companion service as seen through its one-way call channel.
///
/// `Ok(())` means the call was handed to the transport, not that the remote
/// has processed it.
///
/// Calls are made while the proxy holds its state lock. An implementation
/// must not call back into the proxy (including `on_crash`) from inside a
/// call; report failures through the returned error instead.
pub trait RemoteEndpoint: Send + Sync {
    fn notify_lifecycle_event(
        &self,
        stage: LifecycleStage,
        timestamp_ms: u64,
        from: UserId,
        to: UserId,
    ) -> Result<(), TransportError>;

    fn init_boot_user(&self) -> Result<(), TransportError>;

    fn pre_create_users(&self) -> Result<(), TransportError>;
}

pub type RemoteHandle = Arc<dyn RemoteEndpoint>;

/// Identity comparison of two handles (same underlying endpoint object).
pub fn same_endpoint(a: &RemoteHandle, b: &RemoteHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
