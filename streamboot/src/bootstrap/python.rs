//! Interpreter resolution, health probes, and pip invocations.

use crate::process::Invocation;
use std::path::{Path, PathBuf};

/// Where the chosen interpreter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterSource {
    VirtualEnv,
    System,
}

/// The interpreter used for every subsequent step of a run.
#[derive(Debug, Clone)]
pub struct Interpreter {
    pub path: PathBuf,
    pub source: InterpreterSource,
}

/// Venv interpreter path for the current platform.
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// Activation hook file for the current platform.
pub fn activation_hook(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("activate.bat")
    } else {
        venv_dir.join("bin").join("activate")
    }
}

fn venv_bin_dir(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts")
    } else {
        venv_dir.join("bin")
    }
}

fn system_fallback() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

/// Pick the interpreter for this run: the venv interpreter when present,
/// otherwise the first system Python on PATH. This never fails; when PATH
/// has no Python either, the bare interpreter name is returned and the
/// health check reports it as unusable.
pub fn resolve_interpreter(app_dir: &Path, venv_dir: &str) -> Interpreter {
    resolve_interpreter_with(app_dir, venv_dir, find_system_python)
}

/// Resolution with an injectable system lookup, for tests.
pub fn resolve_interpreter_with(
    app_dir: &Path,
    venv_dir: &str,
    find_system: impl FnOnce() -> Option<PathBuf>,
) -> Interpreter {
    let candidate = venv_python(&app_dir.join(venv_dir));
    if candidate.exists() {
        return Interpreter {
            path: candidate,
            source: InterpreterSource::VirtualEnv,
        };
    }

    let path = find_system().unwrap_or_else(|| PathBuf::from(system_fallback()));
    Interpreter {
        path,
        source: InterpreterSource::System,
    }
}

fn find_system_python() -> Option<PathBuf> {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}

/// `python --version` health probe.
pub fn version_probe(python: &Path) -> Invocation {
    Invocation::new(python).arg("--version")
}

/// Import probe: succeeds iff `package` is importable, printing its version.
pub fn import_probe(python: &Path, package: &str) -> Invocation {
    Invocation::new(python)
        .arg("-c")
        .arg(format!("import {package}; print({package}.__version__)"))
}

/// `python -m pip install --upgrade pip`.
pub fn pip_upgrade(python: &Path) -> Invocation {
    Invocation::new(python).args(["-m", "pip", "install", "--upgrade", "pip"])
}

/// `python -m pip install <package>`.
pub fn pip_install(python: &Path, package: &str) -> Invocation {
    Invocation::new(python)
        .args(["-m", "pip", "install"])
        .arg(package)
}

/// Environment overlay equivalent to sourcing the activation hook.
///
/// Returned as an explicit mapping handed to subsequent invocations instead
/// of mutating the launcher's own environment.
pub fn activation_overlay(venv_dir: &Path) -> Vec<(String, String)> {
    let bin = venv_bin_dir(venv_dir);
    let sep = if cfg!(windows) { ";" } else { ":" };
    let path = match std::env::var("PATH") {
        Ok(existing) => format!("{}{}{}", bin.display(), sep, existing),
        Err(_) => bin.display().to_string(),
    };

    vec![
        ("VIRTUAL_ENV".to_string(), venv_dir.display().to_string()),
        ("PATH".to_string(), path),
    ]
}
