//! Runtime Configuration
//!
//! Defaults overlaid by `OBD_DASH_*` environment variables.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of every environment variable read by [`Settings::load`]
pub const ENV_PREFIX: &str = "OBD_DASH";

/// Process settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Interface to bind
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Poll cycle period
    pub poll_interval_ms: u64,
    /// Per-signal query timeout
    pub query_timeout_ms: u64,
    /// Minimum gap between adapter reconnect attempts
    pub reconnect_interval_ms: u64,
    /// Serial device of the ELM327 adapter
    pub device: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Simulate the adapter instead of opening `device`
    pub mock: bool,
    /// Selection file; defaults to `~/obd_dashboard/config.json`
    #[serde(default)]
    pub selection_path: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_environment(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5000_i64)?
            .set_default("poll_interval_ms", 1000_i64)?
            .set_default("query_timeout_ms", 1000_i64)?
            .set_default("reconnect_interval_ms", 5000_i64)?
            .set_default("device", "/dev/rfcomm0")?
            .set_default("baud_rate", 38400_i64)?
            .set_default("mock", false)?
            .set_default("log_level", "info")?
            .set_default("log_json", false)?
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "query_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn selection_path(&self) -> PathBuf {
        self.selection_path
            .clone()
            .unwrap_or_else(signals::default_selection_path)
    }
}
