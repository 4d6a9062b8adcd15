//! Connection-reliability proxy between the platform supervisor and the
//! companion service: records user lifecycle and one-shot actions at any time,
//! and replays them whenever the companion (re)connects.

pub mod config;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod pending;
pub mod proxy;
pub mod remote;
pub mod supervisor;
pub mod types;

#[cfg(any(feature = "test-fixtures", test))]
pub mod mock;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use ledger::LifecycleLedger;
pub use metrics::{MetricsSink, NoopMetrics, UserMetrics};
pub use pending::PendingActionSet;
pub use proxy::{ConnectionProxy, ProxyDump};
pub use remote::{RemoteEndpoint, RemoteHandle, TransportError};
pub use supervisor::{NoopSupervisor, Supervisor};
pub use types::{ActionId, LifecycleEvent, LifecycleStage, UserId, now_wallclock_ms};
