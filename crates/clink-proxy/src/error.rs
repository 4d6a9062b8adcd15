use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("unknown lifecycle stage {0}")]
    UnknownStage(i32),
    #[error("unknown lifecycle stage '{0}'")]
    UnknownStageName(String),
    #[error("unknown action id {0}")]
    UnknownAction(i32),
    #[error("unknown action '{0}'")]
    UnknownActionName(String),
    #[error("invalid config value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}
