//! Codemod selection and invocation.
//!
//! The codemod is an opaque external collaborator: a Python script that
//! patches the app's source tree in place. The launcher only picks the
//! first candidate filename that exists and runs it in write mode.

use crate::process::Invocation;
use std::path::{Path, PathBuf};

/// Pick the first candidate filename that exists in `app_dir`.
pub fn select_script(app_dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| app_dir.join(name))
        .find(|path| path.is_file())
}

/// `python <script> <app-dir> --write` (without `--write` the script dry-runs).
pub fn run_invocation(python: &Path, script: &Path, app_dir: &Path) -> Invocation {
    Invocation::new(python)
        .arg(script.display().to_string())
        .arg(app_dir.display().to_string())
        .arg("--write")
        .current_dir(app_dir)
}
