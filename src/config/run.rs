//! Run configuration, loaded from TOML.
//!
//! ```toml
//! target = 100
//! offset = 0
//! replace_skips = true
//! dataset = "data/items.jsonl"
//! output = "results.jsonl"
//!
//! [device_env]
//! cache_dir = "/models/hub"
//!
//! [processor]
//! command = ["./attack.py", "--recipe", "textfooler"]
//! params = { model = "bert-base-uncased" }
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Everything one run needs. Immutable once the run starts.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Number of outcomes that must be finalized.
    #[serde(default = "default_target")]
    pub target: usize,
    /// Dataset records to skip before seeding.
    #[serde(default)]
    pub offset: u64,
    /// Replace skipped outcomes with fresh items instead of finalizing them.
    #[serde(default)]
    pub replace_skips: bool,
    /// Device count. `None` means discover.
    #[serde(default)]
    pub devices: Option<usize>,
    /// JSONL dataset path.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    /// JSONL results path.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Don't echo per-item results to stdout. The summary is always printed.
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub device_env: DeviceEnvConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

/// Names and values of the per-worker environment settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceEnvConfig {
    /// Variable selecting the physical device; set to the worker's handle.
    pub visible_devices_var: String,
    /// Variable controlling the runtime's diagnostic verbosity.
    pub log_level_var: String,
    pub log_level: String,
    /// Variable pointing at the model cache.
    pub cache_dir_var: String,
    /// Defaults to `$HOME/.cache/tensorflow-hub`.
    pub cache_dir: Option<PathBuf>,
}

impl Default for DeviceEnvConfig {
    fn default() -> Self {
        Self {
            visible_devices_var: "CUDA_VISIBLE_DEVICES".to_string(),
            log_level_var: "TF_CPP_MIN_LOG_LEVEL".to_string(),
            log_level: "3".to_string(),
            cache_dir_var: "TFHUB_CACHE_DIR".to_string(),
            cache_dir: None,
        }
    }
}

/// The command hook each worker drives.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Program followed by its arguments.
    #[serde(default)]
    pub command: Vec<String>,
    /// Passed to the hook as JSON in `DEVPOOL_PARAMS`.
    #[serde(default)]
    pub params: serde_json::Value,
    /// How long a hook may take to exit after its stdin closes before it is
    /// killed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            params: serde_json::Value::Null,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_target() -> usize {
    5
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            offset: 0,
            replace_skips: false,
            devices: None,
            dataset: None,
            output: None,
            quiet: false,
            device_env: DeviceEnvConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad run config: {e}")))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read run config {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad run config {}: {e}", path.display())))
    }

    /// Check the settings a command-hook run depends on.
    pub fn validate(&self) -> Result<()> {
        if self.devices == Some(0) {
            return Err(Error::Config("devices must be at least 1".to_string()));
        }
        if self.processor.command.is_empty() {
            return Err(Error::Config("processor command is empty".to_string()));
        }
        if self.dataset.is_none() {
            return Err(Error::Config("no dataset configured".to_string()));
        }
        let env = &self.device_env;
        for name in [
            &env.visible_devices_var,
            &env.log_level_var,
            &env.cache_dir_var,
        ] {
            if name.is_empty() || name.contains('=') {
                return Err(Error::Config(format!(
                    "invalid environment variable name {name:?}"
                )));
            }
        }
        Ok(())
    }
}
