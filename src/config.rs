//! Configuration for the status server
//!
//! Declares the engine settings, the devices to connect to and the attributes
//! to collect from each of them. Loaded from a TOML file with
//! `STATUS_SERVER__*` environment overrides, e.g.
//! `STATUS_SERVER__ENGINE__WORKER_THREADS=8`.

use crate::data::{AttributeName, Interpolation, Method};
use crate::error::{Result, StatusServerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusServerConfig {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Devices and their attributes
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Groups created at startup
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often history older than the previous maintenance run is trimmed
    #[serde(with = "humantime_serde", default = "default_maintenance_interval")]
    pub maintenance_interval: Duration,

    /// Worker threads of the scheduler pool
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Render records with aliases instead of full names
    #[serde(default)]
    pub use_aliases: bool,
}

fn default_maintenance_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_worker_threads() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: default_maintenance_interval(),
            worker_threads: default_worker_threads(),
            use_aliases: false,
        }
    }
}

/// One remote device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name as understood by the client factory
    pub name: String,

    /// Attributes to collect
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
}

/// Declarative description of one attribute to collect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name on the device
    pub name: String,

    /// Optional short name used in rendered records
    #[serde(default)]
    pub alias: Option<String>,

    /// poll or event
    #[serde(default)]
    pub method: Method,

    /// Interpolation policy name (last, nearest, linear)
    #[serde(default = "default_interpolation")]
    pub interpolation: String,

    /// Delay between two polls, in milliseconds
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    /// Minimal change for a numeric sample to be stored
    #[serde(default)]
    pub precision: f64,
}

fn default_interpolation() -> String {
    "last".to_string()
}

fn default_poll_delay_ms() -> u64 {
    1_000
}

impl AttributeDescriptor {
    /// Descriptor with default policy settings
    pub fn new(name: &str, method: Method) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            method,
            interpolation: default_interpolation(),
            poll_delay_ms: default_poll_delay_ms(),
            precision: 0.0,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_poll_delay_ms(mut self, poll_delay_ms: u64) -> Self {
        self.poll_delay_ms = poll_delay_ms;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_interpolation(mut self, interpolation: &str) -> Self {
        self.interpolation = interpolation.to_string();
        self
    }

    pub fn interpolation_policy(&self) -> Result<Interpolation> {
        self.interpolation.parse()
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

/// Named set of attribute full names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl StatusServerConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StatusServerError::config(format!(
                "Configuration file {} does not exist",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("STATUS_SERVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: StatusServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StatusServerConfig = toml::from_str(content)
            .map_err(|e| StatusServerError::config(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for mistakes that would only show up at runtime
    pub fn validate(&self) -> Result<()> {
        if self.engine.worker_threads == 0 {
            return Err(StatusServerError::config("worker_threads must be at least 1"));
        }
        if self.engine.maintenance_interval.is_zero() {
            return Err(StatusServerError::config("maintenance_interval must not be zero"));
        }

        let mut full_names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(StatusServerError::config("Device name must not be empty"));
            }
            for attribute in &device.attributes {
                if attribute.name.trim().is_empty() {
                    return Err(StatusServerError::config(format!(
                        "Device {} has an attribute without a name",
                        device.name
                    )));
                }
                if attribute.precision < 0.0 || attribute.precision.is_nan() {
                    return Err(StatusServerError::config(format!(
                        "Precision of {}/{} must be a non-negative number",
                        device.name, attribute.name
                    )));
                }
                if attribute.method == Method::Poll && attribute.poll_delay_ms == 0 {
                    return Err(StatusServerError::config(format!(
                        "Poll delay of {}/{} must not be zero",
                        device.name, attribute.name
                    )));
                }
                attribute.interpolation_policy()?;

                let full_name = AttributeName::full_name_of(&device.name, &attribute.name);
                if !full_names.insert(full_name.clone()) {
                    return Err(StatusServerError::config(format!(
                        "Attribute {full_name} is declared twice"
                    )));
                }
            }
        }

        for group in &self.groups {
            if let Some(unknown) = group.attributes.iter().find(|name| !full_names.contains(*name)) {
                return Err(StatusServerError::config(format!(
                    "Group {} references undeclared attribute {unknown}",
                    group.name
                )));
            }
        }

        Ok(())
    }
}
