use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i32);

impl UserId {
    /// The always-present system user.
    pub const SYSTEM: UserId = UserId(0);
    /// Sentinel for "no user": a switch without predecessor, or a not-found result.
    pub const NULL: UserId = UserId(-10000);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Ordered phases of a user session.
///
/// STARTING..=UNLOCKED are progress markers kept per user; STOPPING and
/// STOPPED are terminal and erase the user from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum LifecycleStage {
    Starting = 1,
    Switching = 2,
    Unlocking = 3,
    Unlocked = 4,
    Stopping = 5,
    Stopped = 6,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 6] = [
        LifecycleStage::Starting,
        LifecycleStage::Switching,
        LifecycleStage::Unlocking,
        LifecycleStage::Unlocked,
        LifecycleStage::Stopping,
        LifecycleStage::Stopped,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStage::Starting => "starting",
            LifecycleStage::Switching => "switching",
            LifecycleStage::Unlocking => "unlocking",
            LifecycleStage::Unlocked => "unlocked",
            LifecycleStage::Stopping => "stopping",
            LifecycleStage::Stopped => "stopped",
        }
    }

    /// Whether the stage is stored in the ledger (as opposed to erasing the user).
    pub fn is_progress(self) -> bool {
        self <= LifecycleStage::Unlocked
    }
}

impl TryFrom<i32> for LifecycleStage {
    type Error = ProxyError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        LifecycleStage::ALL
            .into_iter()
            .find(|stage| stage.as_i32() == value)
            .ok_or(ProxyError::UnknownStage(value))
    }
}

impl FromStr for LifecycleStage {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        LifecycleStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == needle)
            .ok_or_else(|| ProxyError::UnknownStageName(s.to_string()))
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot startup actions the supervisor asks the companion to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ActionId {
    InitBootUser = 1,
    PreCreateUsers = 2,
}

impl ActionId {
    pub const ALL: [ActionId; 2] = [ActionId::InitBootUser, ActionId::PreCreateUsers];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionId::InitBootUser => "init_boot_user",
            ActionId::PreCreateUsers => "pre_create_users",
        }
    }
}

impl TryFrom<i32> for ActionId {
    type Error = ProxyError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        ActionId::ALL
            .into_iter()
            .find(|action| *action as i32 == value)
            .ok_or(ProxyError::UnknownAction(value))
    }
}

impl FromStr for ActionId {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ActionId::ALL
            .into_iter()
            .find(|action| action.as_str() == needle)
            .ok_or_else(|| ProxyError::UnknownActionName(s.to_string()))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification as delivered to the remote and the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub stage: LifecycleStage,
    pub timestamp_ms: u64,
    pub from: UserId,
    pub to: UserId,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} -> {})", self.stage, self.from, self.to)
    }
}

/// Milliseconds since the unix epoch; 0 if the clock is before the epoch.
pub fn now_wallclock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
