//! Run command: drive a proxy through a script.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use clink_proxy::{ConnectionProxy, ProxyConfig, RemoteHandle, UserMetrics};
use serde_json::json;

use crate::console::{ConsoleRemote, OutputFormat};
use crate::script::{Step, load_script};
use crate::supervisor::{CrashPolicy, ScriptSupervisor};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON script
    pub script: PathBuf,

    /// Supervisor reaction to a companion crash (env: CLINK_ON_CRASH)
    #[arg(long, value_enum, default_value_t = CrashPolicy::Continue, env = "CLINK_ON_CRASH")]
    pub on_crash: CrashPolicy,

    /// Print the transcript as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_run(args: &RunArgs) -> Result<()> {
    let steps = load_script(&args.script)?;
    let config = ProxyConfig::from_env().context("load proxy config")?;
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let supervisor = Arc::new(ScriptSupervisor::new(args.on_crash, format));
    let metrics = Arc::new(UserMetrics::new(config.metrics_history));
    let proxy = ConnectionProxy::new(&config, supervisor.clone(), metrics);

    let mut current: Option<Arc<ConsoleRemote>> = None;
    let mut connections = 0usize;

    tracing::info!("running {} step(s) from {}", steps.len(), args.script.display());
    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        match *step {
            Step::Lifecycle { stage, from, to } => proxy.record_lifecycle_event(stage, from, to),
            Step::Action(action) => proxy.save_or_run(action),
            Step::Connect => {
                connections += 1;
                let remote = Arc::new(ConsoleRemote::new(connections, format));
                current = Some(remote.clone());
                proxy.on_connected(remote as RemoteHandle);
            }
            Step::Reconnect => {
                let Some(remote) = current.clone() else {
                    bail!("step {number}: reconnect before any connect");
                };
                proxy.on_connected(remote as RemoteHandle);
            }
            Step::FailNext => {
                let Some(remote) = current.as_ref() else {
                    bail!("step {number}: fail_next before any connect");
                };
                remote.fail_next();
            }
            Step::Crash => proxy.on_crash(),
            Step::Dump => {
                let dump = proxy.dump();
                match format {
                    OutputFormat::Text => print!("{dump}"),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&dump)?),
                }
            }
        }

        if supervisor.abort_requested() {
            bail!("companion crashed at step {number}; aborting run");
        }
    }

    let status = proxy.link_status();
    format.emit(
        || {
            format!(
                "done steps={} crashes={} status={status:?}",
                steps.len(),
                supervisor.crashes()
            )
        },
        || json!({"done": steps.len(), "crashes": supervisor.crashes(), "status": status}),
    );
    Ok(())
}
