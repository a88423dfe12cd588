//! Configuration loading

use anyhow::Result;
use dynctrl_core::{AlreadyExistsPolicy, Options};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub v4l2: V4l2Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Collect and print diagnostic messages
    #[serde(default = "default_true")]
    pub report_errors: bool,
    /// Retrieve the document's meta information (always on with --verbose)
    #[serde(default)]
    pub retrieve_meta: bool,
    /// Skip checks for unknown document sections
    #[serde(default)]
    pub skip_validation: bool,
    /// When a driver answer of "already exists" counts as success
    #[serde(default)]
    pub already_exists: AlreadyExistsPolicy,
    /// Kernel driver whose devices are processed
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            report_errors: true,
            retrieve_meta: false,
            skip_validation: false,
            already_exists: AlreadyExistsPolicy::default(),
            driver: default_driver(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_driver() -> String {
    "uvcvideo".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V4l2Config {
    /// Directory holding the video device nodes
    #[serde(default = "default_dev_dir")]
    pub dev_dir: PathBuf,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            dev_dir: default_dev_dir(),
        }
    }
}

fn default_dev_dir() -> PathBuf {
    PathBuf::from("/dev")
}

impl Config {
    /// Convert to session Options
    pub fn to_options(&self) -> Options {
        Options {
            report_errors: self.import.report_errors,
            retrieve_meta: self.import.retrieve_meta,
            skip_validation: self.import.skip_validation,
            already_exists: self.import.already_exists,
            driver: self.import.driver.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
