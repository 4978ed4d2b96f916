//! Configuration types for gpusched

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Device, GpuschedError, GpuschedResult, DEFAULT_DEVICE_ENV_VAR};

/// Default seconds the daemon sleeps when it has nothing to dispatch
pub const DEFAULT_WAKE_INTERVAL_SECS: u64 = 10;

/// Default ceiling on the number of pending jobs
pub const DEFAULT_PENDING_CAPACITY: usize = 10_000;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API server configuration
    pub api: ApiConfig,
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> GpuschedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GpuschedError::Config(format!("Failed to read config file: {}", e))
        })?;
        let config: DaemonConfig = toml::from_str(&content)
            .map_err(|e| GpuschedError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that cannot be repaired at runtime
    pub fn validate(&self) -> GpuschedResult<()> {
        self.scheduler.validate()
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8844,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Device slots to schedule onto. Repeats allowed, `""` is a CPU slot.
    pub devices: Vec<Device>,
    /// Seconds to sleep when no device is free or no job is pending
    pub wake_interval_secs: u64,
    /// Maximum number of pending jobs
    pub pending_capacity: usize,
    /// Environment variable carrying the leased device to the child
    pub device_env_var: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            devices: vec![Device::new("0")],
            wake_interval_secs: DEFAULT_WAKE_INTERVAL_SECS,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            device_env_var: DEFAULT_DEVICE_ENV_VAR.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Create a scheduler configuration for the given device slots
    pub fn with_devices<I, D>(devices: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Device>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The device list and env var name must be usable; bad interval or
    /// capacity values are absorbed by the scheduler instead.
    pub fn validate(&self) -> GpuschedResult<()> {
        if self.devices.is_empty() {
            return Err(GpuschedError::Config(
                "device list is empty; configure at least one slot".to_string(),
            ));
        }
        if self.device_env_var.is_empty() {
            return Err(GpuschedError::Config(
                "device_env_var must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or env-filter directive
    pub level: String,
    /// Log format
    pub format: LogFormat,
    /// Log file path (stderr when unset)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
