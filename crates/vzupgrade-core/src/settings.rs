use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::HostLayout;

pub const DEFAULT_MIN_FREE_GB: u64 = 5;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 30;

/// Operator-tunable knobs read from `/etc/vzupgrade/vzupgrade.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub free_space_path: PathBuf,
    pub min_free_gb: u64,
    pub incompatible_agent_units: Vec<String>,
    /// Appended to the built-in list of supported container templates.
    pub extra_supported_templates: Vec<String>,
    pub precheck_hooks_dir: PathBuf,
    pub preinstall_hooks_dir: PathBuf,
    pub retry_interval_secs: u64,
    pub retry_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            free_space_path: PathBuf::from("/var/lib"),
            min_free_gb: DEFAULT_MIN_FREE_GB,
            incompatible_agent_units: vec![
                "va-agent.service".to_string(),
                "vstorage-ui-agent.service".to_string(),
            ],
            extra_supported_templates: Vec::new(),
            precheck_hooks_dir: PathBuf::from("/etc/vzupgrade/precheck.d"),
            preinstall_hooks_dir: PathBuf::from("/etc/vzupgrade/preinstall.d"),
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse vzupgrade settings")?;
        if settings.retry_attempts == 0 {
            return Err(anyhow!("retry_attempts must be at least 1"));
        }
        if settings.free_space_path.as_os_str().is_empty() {
            return Err(anyhow!("free_space_path must not be empty"));
        }
        Ok(settings)
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read settings: {}", path.display()));
            }
        };

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid settings file: {}", path.display()))
    }

    /// Loads an explicitly requested file, which must exist, or the optional
    /// default file under `layout`.
    pub fn resolve(config: Option<&Path>, layout: &HostLayout) -> Result<Self> {
        match config {
            Some(path) if !path.is_file() => {
                Err(anyhow!("settings file not found: {}", path.display()))
            }
            Some(path) => Self::load(path),
            None => Self::load(&layout.default_settings_path()),
        }
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_gb.saturating_mul(1024 * 1024 * 1024)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}
