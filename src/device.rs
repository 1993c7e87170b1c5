//! Device discovery and per-worker device binding.
//!
//! A binding pairs a worker with one device handle and the environment its
//! processor should run under. Settings follow set-if-absent semantics: a
//! variable already present in the inherited environment is left alone.
//!
//! Workers are threads, so the binding never writes to the process
//! environment. Processors apply [`DeviceBinding::env`] to whatever execution
//! context they control (the command hook passes it to its child process).

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::config::{DeviceEnvConfig, RunConfig};
use crate::error::{Error, Result};

/// Always exported so a processor can tell which handle it was given.
pub const DEVICE_VAR: &str = "DEVPOOL_DEVICE";

/// A worker's exclusive device handle and its resolved environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    device: usize,
    env: BTreeMap<String, String>,
}

impl DeviceBinding {
    /// Bind against the current process environment.
    pub fn bind(device: usize, config: &DeviceEnvConfig) -> Self {
        Self::bind_with(device, config, |name| std::env::var(name).ok())
    }

    /// Bind against an arbitrary environment lookup.
    pub fn bind_with(
        device: usize,
        config: &DeviceEnvConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut env = BTreeMap::new();
        let mut set_if_absent = |name: &str, value: String| {
            if lookup(name).is_none() {
                env.insert(name.to_string(), value);
            }
        };

        set_if_absent(&config.visible_devices_var, device.to_string());
        set_if_absent(&config.log_level_var, config.log_level.clone());

        let cache_dir = config.cache_dir.clone().or_else(|| {
            lookup("HOME").map(|home| PathBuf::from(home).join(".cache/tensorflow-hub"))
        });
        if let Some(dir) = cache_dir {
            set_if_absent(&config.cache_dir_var, dir.display().to_string());
        }

        env.insert(DEVICE_VAR.to_string(), device.to_string());

        debug!(device, vars = env.len(), "device bound");
        Self { device, env }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    /// Variables to set in the processor's execution context.
    pub fn env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

/// How many devices the pool should bind.
///
/// An explicit `devices` setting wins, then the entries of an inherited
/// visible-devices variable, then the GPUs `nvidia-smi` lists.
pub fn discover(config: &RunConfig) -> Result<usize> {
    discover_with(
        config,
        |name| std::env::var(name).ok(),
        query_nvidia_smi,
    )
}

pub fn discover_with(
    config: &RunConfig,
    lookup: impl Fn(&str) -> Option<String>,
    probe: impl FnOnce() -> Result<usize>,
) -> Result<usize> {
    if let Some(n) = config.devices {
        if n == 0 {
            return Err(Error::NoDevices("devices is set to 0".to_string()));
        }
        return Ok(n);
    }

    let var = &config.device_env.visible_devices_var;
    if let Some(visible) = lookup(var) {
        let n = visible
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .count();
        if n == 0 {
            return Err(Error::NoDevices(format!("{var} is empty")));
        }
        return Ok(n);
    }

    match probe()? {
        0 => Err(Error::NoDevices("nvidia-smi listed no GPUs".to_string())),
        n => Ok(n),
    }
}

fn query_nvidia_smi() -> Result<usize> {
    let output = std::process::Command::new("nvidia-smi")
        .arg("--list-gpus")
        .output()
        .map_err(|e| {
            Error::NoDevices(format!(
                "failed to execute nvidia-smi ({e}); set `devices` explicitly"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::NoDevices(format!("nvidia-smi failed: {stderr}")));
    }

    Ok(count_listed_gpus(&String::from_utf8_lossy(&output.stdout)))
}

fn count_listed_gpus(raw: &str) -> usize {
    raw.lines()
        .filter(|line| line.trim_start().starts_with("GPU "))
        .count()
}
