//! Check command: validate a script without running it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::script::load_script;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the JSON script
    pub script: PathBuf,
}

pub fn cmd_check(args: &CheckArgs) -> Result<()> {
    let steps = load_script(&args.script)?;
    println!("ok: {} step(s)", steps.len());
    Ok(())
}
