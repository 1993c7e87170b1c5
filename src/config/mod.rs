//! Typed configuration.
//!
//! [`Config`] is the process environment (telemetry endpoint, log level),
//! loaded once at startup. [`RunConfig`] describes one run and is shared
//! read-only with every worker.

pub mod run;

pub use run::{DeviceEnvConfig, ProcessorConfig, RunConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Self {
        Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
