//! Entry-point verification and the foreground streamlit invocation.

use crate::process::Invocation;
use std::path::{Path, PathBuf};

pub fn entry_path(app_dir: &Path, entry: &str) -> PathBuf {
    app_dir.join(entry)
}

/// `python -m streamlit run <entry> --server.port <port>`, run from the
/// app directory so streamlit picks up its pages/ and config.
pub fn launch_invocation(
    python: &Path,
    app_dir: &Path,
    package: &str,
    entry: &str,
    port: u16,
) -> Invocation {
    Invocation::new(python)
        .args(["-m", package, "run"])
        .arg(entry)
        .arg("--server.port")
        .arg(port.to_string())
        .current_dir(app_dir)
}
