//! Configuration structures for the update system.
//!
//! Defines how often remote checks run, how downloads are retried and
//! verified, and where work files, throttle state and installs live.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Default base URL of the release metadata API.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Main updater configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Minimum interval between unforced update checks in hours
    #[serde(default = "default_check_interval")]
    pub check_interval_hours: u32,

    /// Download attempts allowed after the first one
    #[serde(default = "default_max_retries")]
    pub max_download_retries: u32,

    /// Whether to verify content hashes published with releases
    #[serde(default = "default_true")]
    pub verify_hash: bool,

    /// Skip reinstalling destinations already marked with the expected hash
    #[serde(default)]
    pub use_install_marker: bool,

    /// Directory inside the release archive that gets installed
    #[serde(default = "default_archive_subdir")]
    pub archive_subdir: PathBuf,

    /// Seconds the self-replace script waits for this process to exit
    #[serde(default = "default_handoff_delay")]
    pub handoff_delay_secs: u64,

    /// Working directory for downloads and installs (empty = temp dir)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Root of the check throttle store (empty = temp dir)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Bearer token sent with downloads
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Base URL of the release metadata API
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval(),
            max_download_retries: default_max_retries(),
            verify_hash: true,
            use_install_marker: false,
            archive_subdir: default_archive_subdir(),
            handoff_delay_secs: default_handoff_delay(),
            work_dir: None,
            state_dir: None,
            auth_token: None,
            api_base: default_api_base(),
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, UpdateError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Working directory for `owner/repo`, using `<temp>/<owner>/<repo>`
    /// when none is configured.
    pub fn work_dir_for(&self, owner: &str, repo: &str) -> PathBuf {
        match &self.work_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(owner).join(repo),
        }
    }

    /// Root directory of the throttle store. The store adds `<owner>/<repo>`
    /// itself, so by default timestamps sit beside the default work dirs.
    pub fn state_root(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        }
    }

    /// Minimum interval between unforced checks.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_hours) * 3600)
    }

    /// Delay before the self-replace script acts.
    pub fn handoff_delay(&self) -> Duration {
        Duration::from_secs(self.handoff_delay_secs)
    }
}

// Default value functions for serde
fn default_check_interval() -> u32 {
    24 // Daily
}

fn default_max_retries() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_archive_subdir() -> PathBuf {
    PathBuf::from("bin")
}

fn default_handoff_delay() -> u64 {
    3
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
