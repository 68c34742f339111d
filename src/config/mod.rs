//! Configuration management for the auto-calibrate host

use crate::error::{CalibrationError, Result};
use crate::host::DeviceLink;
use crate::sensor::{derive_object_id, OUTPUT_DOMAIN};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configured calibrated sensors
    #[serde(default)]
    pub sensors: Vec<SensorEntry>,
}

/// Where published snapshots are persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON state file
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("auto-calibrate")
        .join("state.json")
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `auto_calibrate=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file (rotated daily)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Log to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            stderr: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// One configured calibrated sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntry {
    /// Stable entry identifier
    #[serde(default = "new_entry_id")]
    pub entry_id: String,

    /// Upstream entity to observe, e.g. `sensor.soil_sensor`
    pub source_entity: String,

    /// Display name override
    #[serde(default)]
    pub name: Option<String>,

    /// Object id override for the calibrated entity
    #[serde(default)]
    pub object_id: Option<String>,

    /// Device to attach the calibrated entity to
    #[serde(default)]
    pub device: Option<DeviceLink>,
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SensorEntry {
    /// Create an entry with a fresh id and no overrides
    pub fn new<S: Into<String>>(source_entity: S) -> Self {
        Self {
            entry_id: new_entry_id(),
            source_entity: source_entity.into(),
            name: None,
            object_id: None,
            device: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_object_id<S: Into<String>>(mut self, object_id: S) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Host-visible id of the calibrated entity this entry produces
    pub fn output_entity_id(&self) -> String {
        format!(
            "{}.{}",
            OUTPUT_DOMAIN,
            derive_object_id(&self.source_entity, self.object_id.as_deref())
        )
    }

    /// Validate a single entry
    pub fn validate(&self) -> Result<()> {
        if self.entry_id.trim().is_empty() {
            return Err(CalibrationError::config("Sensor entry_id cannot be empty"));
        }

        match self.source_entity.split_once('.') {
            Some((domain, id)) if !domain.is_empty() && !id.is_empty() => Ok(()),
            _ => Err(CalibrationError::config(format!(
                "Invalid source_entity {:?}: expected <domain>.<id>",
                self.source_entity
            ))),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalibrationError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CalibrationError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CalibrationError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CalibrationError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = env::var("AUTO_CALIBRATE_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }

        if let Ok(file) = env::var("AUTO_CALIBRATE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        if let Ok(stderr) = env::var("AUTO_CALIBRATE_LOG_STDERR") {
            self.logging.stderr = match stderr.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(CalibrationError::config(format!(
                        "Invalid AUTO_CALIBRATE_LOG_STDERR: {}. Use 'true' or 'false'",
                        stderr
                    )));
                }
            };
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.as_os_str().is_empty() {
            return Err(CalibrationError::config("Storage path cannot be empty"));
        }

        let mut entry_ids = HashSet::new();
        let mut sources = HashSet::new();
        let mut outputs = HashSet::new();

        for sensor in &self.sensors {
            sensor.validate()?;

            if !entry_ids.insert(sensor.entry_id.as_str()) {
                return Err(CalibrationError::config(format!(
                    "Duplicate entry_id {}",
                    sensor.entry_id
                )));
            }

            if !sources.insert(sensor.source_entity.as_str()) {
                return Err(CalibrationError::config(format!(
                    "Source entity {} is configured more than once",
                    sensor.source_entity
                )));
            }

            let output = sensor.output_entity_id();
            if !outputs.insert(output.clone()) {
                return Err(CalibrationError::config(format!(
                    "Output entity {} would be produced by more than one sensor",
                    output
                )));
            }
        }

        Ok(())
    }
}
