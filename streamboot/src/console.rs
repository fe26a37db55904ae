//! Console acknowledgment for fatal and advisory paths.
//!
//! When the launcher is started by double-click the window vanishes the
//! moment the process exits, so every terminal diagnostic blocks for a
//! keypress. The trait keeps that blocking behavior injectable for tests
//! and scripted use.

use anyhow::Result;
use std::io::{self, BufRead, Write};

/// Injectable confirmation collaborator.
pub trait Acknowledge {
    /// Show `message` and block until the user acknowledges it.
    fn pause(&self, message: &str) -> Result<()>;
}

/// Real console: prints to stderr, waits for Enter on stdin.
pub struct ConsoleAck;

impl Acknowledge for ConsoleAck {
    fn pause(&self, message: &str) -> Result<()> {
        eprintln!("{message}");
        eprint!("Press Enter to continue... ");
        io::stderr().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

/// Non-blocking acknowledgment for `--no-pause` runs and tests.
pub struct AutoAck;

impl Acknowledge for AutoAck {
    fn pause(&self, message: &str) -> Result<()> {
        eprintln!("{message}");
        Ok(())
    }
}
