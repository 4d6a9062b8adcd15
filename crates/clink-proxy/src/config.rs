use crate::error::ProxyError;
use crate::types::UserId;

pub const ENV_METRICS_HISTORY: &str = "CLINK_METRICS_HISTORY";
pub const ENV_SYSTEM_USER: &str = "CLINK_SYSTEM_USER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Reserved user replayed first; also the initial current user.
    pub system_user: UserId,
    /// Completed start/stop records kept by `UserMetrics`.
    pub metrics_history: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            system_user: UserId::SYSTEM,
            metrics_history: 10,
        }
    }
}

impl ProxyConfig {
    /// Defaults overridden by `CLINK_METRICS_HISTORY` / `CLINK_SYSTEM_USER`.
    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProxyError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_METRICS_HISTORY) {
            config.metrics_history = parse_value(ENV_METRICS_HISTORY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SYSTEM_USER) {
            let id: i32 = parse_value(ENV_SYSTEM_USER, &raw)?;
            if id < 0 {
                return Err(ProxyError::InvalidConfig {
                    key: ENV_SYSTEM_USER.into(),
                    reason: format!("user id must be non-negative, got {id}"),
                });
            }
            config.system_user = UserId(id);
        }
        Ok(config)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ProxyError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ProxyError::InvalidConfig {
        key: key.into(),
        reason: format!("'{raw}': {err}"),
    })
}
