/// The privileged process that owns the proxy. It is told, once per crash,
/// that the companion stopped accepting calls, and decides what to do about
/// it (restart the companion, kill itself, or nothing).
///
/// Called without the proxy lock held, so implementations may call back into
/// the proxy.
pub trait Supervisor: Send + Sync {
    fn on_remote_crashed(&self);
}

/// Supervisor that ignores crashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSupervisor;

impl Supervisor for NoopSupervisor {
    fn on_remote_crashed(&self) {}
}
