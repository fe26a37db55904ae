//! Append-only run log, one file per launch attempt.
//!
//! The log receives exactly one `step` line per orchestrator step outcome,
//! plus `exec` lines and indented output blocks for every subprocess the
//! launcher runs.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct RunLog {
    file: File,
    path: PathBuf,
}

impl RunLog {
    /// Create `streamboot_<timestamp>.log` in `dir` and write the header.
    pub fn create(dir: &Path) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("streamboot_{stamp}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        let mut log = Self { file, path };
        log.line(
            "launcher",
            &format!("run started {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
        )?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One `[HH:MM:SS] tag: message` line.
    pub fn line(&mut self, tag: &str, message: &str) -> Result<()> {
        writeln!(
            self.file,
            "[{}] {}: {}",
            Local::now().format("%H:%M:%S"),
            tag,
            message
        )
        .context("failed to write to run log")
    }

    /// The step-outcome line; written exactly once per step.
    pub fn step(&mut self, name: &str, outcome: &str, detail: &str) -> Result<()> {
        if detail.is_empty() {
            self.line(&format!("step {name}"), outcome)
        } else {
            self.line(&format!("step {name}"), &format!("{outcome} ({detail})"))
        }
    }

    /// Indented block of captured subprocess output. Empty output is elided.
    pub fn output_block(&mut self, label: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        for line in text.lines() {
            writeln!(self.file, "    {label}| {line}").context("failed to write to run log")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_log(dir: &TempDir) -> String {
        let entry = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().is_some_and(|e| e == "log"))
            .expect("log file present");
        std::fs::read_to_string(entry).unwrap()
    }

    #[test]
    fn test_create_writes_header() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::create(dir.path()).unwrap();
        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("streamboot_"));
        assert!(name.ends_with(".log"));
        drop(log);

        let content = read_log(&dir);
        assert!(content.contains("launcher: run started"));
    }

    #[test]
    fn test_step_and_output_lines() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::create(dir.path()).unwrap();
        log.step("interpreter", "ok", ".venv/bin/python").unwrap();
        log.step("activate", "skipped", "").unwrap();
        log.output_block("out", "Python 3.11.6\n").unwrap();
        log.output_block("err", "   \n").unwrap();
        drop(log);

        let content = read_log(&dir);
        assert!(content.contains("step interpreter: ok (.venv/bin/python)"));
        assert!(content.contains("step activate: skipped"));
        assert!(content.contains("    out| Python 3.11.6"));
        // blank output is elided
        assert!(!content.contains("err|"));
    }
}
