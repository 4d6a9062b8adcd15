mod commands;
mod console;
mod script;
mod supervisor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::check::CheckArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(
    name = "clink",
    version,
    about = "Drive the companion connection proxy from a lifecycle script"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script against console companions and print every outbound call
    Run(RunArgs),

    /// Parse and validate a script without running it
    Check(CheckArgs),
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::cmd_run(&args),
        Command::Check(args) => commands::check::cmd_check(&args),
    }
}

/// Logs go to stderr so stdout carries only the call transcript.
fn setup_logging() {
    let filter = EnvFilter::try_from_env("CLINK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
