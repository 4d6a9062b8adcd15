use crate::remote::{RemoteHandle, same_endpoint};

/// Where the link to the companion stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// No remote has connected yet.
    NeverConnected,
    Connected,
    /// The last outbound call failed; waiting for a reconnect.
    Crashed,
}

/// Current remote handle plus the crashed flag. `remote` is present exactly
/// when the link is usable.
#[derive(Default)]
pub struct ConnectionState {
    remote: Option<RemoteHandle>,
    crashed: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote(&self) -> Option<&RemoteHandle> {
        self.remote.as_ref()
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn status(&self) -> LinkStatus {
        match (&self.remote, self.crashed) {
            (Some(_), _) => LinkStatus::Connected,
            (None, true) => LinkStatus::Crashed,
            (None, false) => LinkStatus::NeverConnected,
        }
    }

    /// Whether `remote` is the handle already stored.
    pub fn is_current(&self, remote: &RemoteHandle) -> bool {
        self.remote
            .as_ref()
            .is_some_and(|stored| same_endpoint(stored, remote))
    }

    pub fn connect(&mut self, remote: RemoteHandle) {
        self.remote = Some(remote);
        self.crashed = false;
    }

    /// Drops the remote and marks the link crashed. Returns false if it was
    /// already crashed.
    pub fn mark_crashed(&mut self) -> bool {
        if self.crashed {
            return false;
        }
        self.remote = None;
        self.crashed = true;
        true
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("connected", &self.remote.is_some())
            .field("crashed", &self.crashed)
            .finish()
    }
}
