//! streamboot - prepare and launch a local Streamlit app.
//!
//! Resolves the app directory, picks a Python interpreter (virtual
//! environment preferred), checks it runs, makes sure streamlit is
//! importable (installing it on demand), optionally applies a codemod to
//! the source tree, then launches the app in the foreground. Every step is
//! appended to a timestamped run log next to the app.

mod bootstrap;
mod config;
mod console;
mod process;
mod runlog;

use anyhow::{Context, Result, ensure};
use bootstrap::{Orchestrator, Verdict};
use clap::Parser;
use config::LaunchConfig;
use console::{Acknowledge, AutoAck, ConsoleAck};
use process::SystemRunner;
use runlog::RunLog;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "streamboot")]
#[command(about = "Prepare and launch a local Streamlit app", long_about = None)]
#[command(version)]
struct Args {
    /// App directory (default: the launcher's own directory)
    app_dir: Option<PathBuf>,

    /// Entry-point filename override
    #[arg(long)]
    entry: Option<String>,

    /// Server port override
    #[arg(long)]
    port: Option<u16>,

    /// Skip the codemod step
    #[arg(long)]
    skip_codemod: bool,

    /// Per-step timeout in seconds (default: wait indefinitely)
    #[arg(long)]
    timeout: Option<u64>,

    /// Never block for a keypress (for scripted use)
    #[arg(long)]
    no_pause: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(verdict) => std::process::exit(verdict.exit_code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<Verdict> {
    let app_dir = resolve_app_dir(args.app_dir)?;

    let mut config = LaunchConfig::load_from(&app_dir).context("failed to load configuration")?;
    if let Some(entry) = args.entry {
        config.entry = entry;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.timeout {
        config.step_timeout_secs = Some(secs);
    }
    if args.skip_codemod {
        config.codemod_candidates.clear();
    }

    let log = RunLog::create(&app_dir)?;
    let ack: Box<dyn Acknowledge> = if args.no_pause {
        Box::new(AutoAck)
    } else {
        Box::new(ConsoleAck)
    };

    let mut orchestrator =
        Orchestrator::new(config, app_dir, Box::new(SystemRunner), ack, log);
    orchestrator.run()
}

/// Anchor to the launcher binary's own directory when no app dir is given,
/// so double-clicking the binary from the app folder just works.
fn resolve_app_dir(arg: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = arg {
        ensure!(
            dir.is_dir(),
            "app directory {} does not exist",
            dir.display()
        );
        return Ok(dir);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    std::env::current_dir().context("failed to resolve current directory")
}
