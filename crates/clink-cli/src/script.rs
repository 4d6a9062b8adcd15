//! Scenario scripts: a JSON array of steps.
//!
//! ```json
//! [
//!   {"op": "lifecycle", "stage": "unlocked", "to": 0},
//!   {"op": "action", "action": "init_boot_user"},
//!   {"op": "connect"},
//!   {"op": "fail_next"},
//!   {"op": "lifecycle", "stage": 2, "from": 0, "to": 10},
//!   {"op": "dump"},
//!   {"op": "crash"},
//!   {"op": "reconnect"}
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use clink_proxy::{ActionId, LifecycleStage, UserId};
use serde::Deserialize;

/// A stage given either by name or by its numeric code.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StageRef {
    Code(i32),
    Name(String),
}

impl StageRef {
    pub fn resolve(&self) -> Result<LifecycleStage, clink_proxy::ProxyError> {
        match self {
            StageRef::Code(code) => LifecycleStage::try_from(*code),
            StageRef::Name(name) => name.parse(),
        }
    }
}

fn null_user() -> i32 {
    UserId::NULL.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RawStep {
    Lifecycle {
        stage: StageRef,
        #[serde(default = "null_user")]
        from: i32,
        to: i32,
    },
    Action {
        action: String,
    },
    Connect,
    Reconnect,
    FailNext,
    Crash,
    Dump,
}

/// A validated step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lifecycle {
        stage: LifecycleStage,
        from: UserId,
        to: UserId,
    },
    Action(ActionId),
    Connect,
    Reconnect,
    FailNext,
    Crash,
    Dump,
}

impl RawStep {
    fn validate(self) -> Result<Step, clink_proxy::ProxyError> {
        Ok(match self {
            RawStep::Lifecycle { stage, from, to } => Step::Lifecycle {
                stage: stage.resolve()?,
                from: UserId(from),
                to: UserId(to),
            },
            RawStep::Action { action } => Step::Action(action.parse()?),
            RawStep::Connect => Step::Connect,
            RawStep::Reconnect => Step::Reconnect,
            RawStep::FailNext => Step::FailNext,
            RawStep::Crash => Step::Crash,
            RawStep::Dump => Step::Dump,
        })
    }
}

pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    let raw: Vec<RawStep> = serde_json::from_str(text).context("parse script JSON")?;
    raw.into_iter()
        .enumerate()
        .map(|(index, step)| {
            step.validate()
                .with_context(|| format!("invalid step {}", index + 1))
        })
        .collect()
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read script {}", path.display()))?;
    parse_script(&text).with_context(|| format!("load script {}", path.display()))
}
