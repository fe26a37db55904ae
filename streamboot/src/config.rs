//! Launch configuration with optional streamboot.toml overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Config filename looked up in the app directory.
pub const CONFIG_FILE: &str = "streamboot.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Streamlit entry-point filename, relative to the app directory.
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Port passed to `streamlit run --server.port`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Package that must be importable before launch.
    #[serde(default = "default_package")]
    pub package: String,

    /// Virtual-environment directory, relative to the app directory.
    #[serde(default = "default_venv_dir")]
    pub venv_dir: String,

    /// Codemod scripts to look for, in preference order.
    #[serde(default = "default_codemod_candidates")]
    pub codemod_candidates: Vec<String>,

    /// Per-step timeout in seconds. None waits indefinitely.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
}

fn default_entry() -> String {
    "Home.py".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_package() -> String {
    "streamlit".to_string()
}

fn default_venv_dir() -> String {
    ".venv".to_string()
}

fn default_codemod_candidates() -> Vec<String> {
    vec![
        "apply_export_preview_and_inputs.py".to_string(),
        "apply_patch.py".to_string(),
    ]
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            port: default_port(),
            package: default_package(),
            venv_dir: default_venv_dir(),
            codemod_candidates: default_codemod_candidates(),
            step_timeout_secs: None,
        }
    }
}

impl LaunchConfig {
    /// Load `streamboot.toml` from `dir`, returning defaults if absent.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: LaunchConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}
