//! Subprocess invocation with captured or inherited output.
//!
//! Every external command the launcher runs goes through the [`ProcessRunner`]
//! trait so the orchestrator can be tested against a scripted double instead
//! of a real Python installation.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// A fully-described subprocess invocation.
///
/// The environment overlay is carried here explicitly rather than mutating
/// the launcher's own process environment.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, overlay: &[(String, String)]) -> Self {
        self.env.extend(overlay.iter().cloned());
        self
    }

    /// Single-line rendering for the run log.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.display().to_string()
        } else {
            format!("{} {}", self.program.display(), self.args.join(" "))
        }
    }
}

/// Result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct Captured {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Injectable collaborator for running external commands.
pub trait ProcessRunner {
    /// Run to completion, collecting stdout and stderr.
    fn run_captured(&self, inv: &Invocation, timeout: Option<Duration>) -> Result<Captured>;

    /// Run in the foreground with inherited stdio, blocking until exit.
    ///
    /// The returned [`Captured`] has empty output fields.
    fn run_foreground(&self, inv: &Invocation, timeout: Option<Duration>) -> Result<Captured>;
}

/// [`ProcessRunner`] backed by `std::process::Command`.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run_captured(&self, inv: &Invocation, timeout: Option<Duration>) -> Result<Captured> {
        let mut cmd = build_command(inv);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning (captured): {}", inv.display());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", inv.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        // Drain both pipes on threads so a chatty child cannot deadlock
        // against a full pipe while we wait on it.
        let stdout_handle = thread::spawn(move || read_lossy(stdout));
        let stderr_handle = thread::spawn(move || read_lossy(stderr));

        let (status, timed_out) = wait_child(&mut child, timeout, inv)?;

        let stdout = stdout_handle
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))??;

        Ok(Captured {
            success: status.success() && !timed_out,
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out,
        })
    }

    fn run_foreground(&self, inv: &Invocation, timeout: Option<Duration>) -> Result<Captured> {
        let mut cmd = build_command(inv);

        debug!("spawning (foreground): {}", inv.display());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", inv.display()))?;

        let (status, timed_out) = wait_child(&mut child, timeout, inv)?;

        Ok(Captured {
            success: status.success() && !timed_out,
            exit_code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
            timed_out,
        })
    }
}

fn build_command(inv: &Invocation) -> Command {
    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args);
    if let Some(ref dir) = inv.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &inv.env {
        cmd.env(key, value);
    }
    cmd
}

/// Wait for the child, optionally bounded by `timeout`.
///
/// A timed-out child is killed and reaped; the caller sees `timed_out = true`.
fn wait_child(
    child: &mut Child,
    timeout: Option<Duration>,
    inv: &Invocation,
) -> Result<(ExitStatus, bool)> {
    match timeout {
        None => {
            let status = child.wait().context("failed to wait for child process")?;
            Ok((status, false))
        }
        Some(limit) => match child
            .wait_timeout(limit)
            .context("failed to wait for child process")?
        {
            Some(status) => Ok((status, false)),
            None => {
                warn!(
                    "command timed out after {}s, killing: {}",
                    limit.as_secs(),
                    inv.display()
                );
                child.kill().context("failed to kill timed-out child")?;
                let status = child.wait().context("failed to reap killed child")?;
                Ok((status, true))
            }
        },
    }
}

fn read_lossy(mut stream: impl Read) -> Result<String> {
    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .context("failed to read child output")?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
