//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link (HC-06) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Paired devices are matched against this name prefix
    #[serde(default = "default_device_name_prefix")]
    pub device_name_prefix: String,

    /// Explicit port path (e.g. `/dev/rfcomm0`); empty means discover
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_line_delimiter")]
    pub line_delimiter: String,
}

/// GPS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PositionConfig {
    /// NMEA receiver port; empty disables real position data
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_gps_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    #[serde(default)]
    pub maximum_age_ms: u64,

    #[serde(default = "default_fix_timeout_ms")]
    pub fix_timeout_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Synthetic fallback configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_rpm_ceiling")]
    pub rpm_ceiling: u16,
}

/// Durable storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: String,
}

// Default value functions
fn default_device_name_prefix() -> String { "HC-06".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_connect_timeout_ms() -> u64 { 3000 }
fn default_line_delimiter() -> String { "\n".to_string() }

fn default_gps_baud_rate() -> u32 { 9600 }
fn default_high_accuracy() -> bool { true }
fn default_fix_timeout_ms() -> u64 { 5000 }
fn default_retry_backoff_ms() -> u64 { 1000 }

fn default_staleness_ms() -> u64 { 3000 }
fn default_tick_interval_ms() -> u64 { 1000 }
fn default_rpm_ceiling() -> u16 { 9000 }

fn default_data_dir() -> String { "./data".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name_prefix: default_device_name_prefix(),
            port: String::new(),
            baud_rate: default_baud_rate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            line_delimiter: default_line_delimiter(),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_gps_baud_rate(),
            high_accuracy: default_high_accuracy(),
            maximum_age_ms: 0,
            fix_timeout_ms: default_fix_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            staleness_ms: default_staleness_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            rpm_ceiling: default_rpm_ceiling(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_enabled: false,
            dir: default_log_dir(),
        }
    }
}

impl LinkConfig {
    /// Handshake timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The single delimiter byte that terminates a sensor frame
    pub fn delimiter_byte(&self) -> u8 {
        self.line_delimiter.as_bytes().first().copied().unwrap_or(b'\n')
    }
}

impl FallbackConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use scooter_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.link.device_name_prefix.is_empty() && self.link.port.is_empty() {
            return Err(invalid("link needs a device_name_prefix or an explicit port"));
        }

        if self.link.line_delimiter.len() != 1 {
            return Err(invalid("line_delimiter must be a single ASCII character"));
        }

        if ![9600, 19200, 38400, 57600, 115200].contains(&self.link.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.link.connect_timeout_ms == 0 || self.link.connect_timeout_ms > 30000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 30000"));
        }

        if self.position.fix_timeout_ms == 0 || self.position.fix_timeout_ms > 60000 {
            return Err(invalid("fix_timeout_ms must be between 1 and 60000"));
        }

        if self.position.retry_backoff_ms == 0 || self.position.retry_backoff_ms > 60000 {
            return Err(invalid("retry_backoff_ms must be between 1 and 60000"));
        }

        if self.fallback.tick_interval_ms == 0 || self.fallback.tick_interval_ms > 60000 {
            return Err(invalid("tick_interval_ms must be between 1 and 60000"));
        }

        // A window shorter than one tick would make every tick synthetic
        if self.fallback.staleness_ms < self.fallback.tick_interval_ms {
            return Err(invalid("staleness_ms must not be shorter than tick_interval_ms"));
        }

        if ![9000, 9999].contains(&self.fallback.rpm_ceiling) {
            return Err(invalid("rpm_ceiling must be 9000 or 9999"));
        }

        if self.storage.data_dir.is_empty() {
            return Err(invalid("storage data_dir cannot be empty"));
        }

        if self.logging.file_enabled && self.logging.dir.is_empty() {
            return Err(invalid("logging dir cannot be empty when file logging is enabled"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}
