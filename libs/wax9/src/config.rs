use std::fmt::Write;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::history;

/// Sent after the settings block to begin streaming.
pub const STREAM_COMMAND: &str = "\r\nSTREAM\r\n";
/// Resets the device, which also drops the link.
pub const RESET_COMMAND: &str = "\r\nRESET\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub enabled: bool,
    pub rate_hz: u16,
}

impl AxisConfig {
    pub const fn new(enabled: bool, rate_hz: u16) -> Self {
        Self { enabled, rate_hz }
    }
}

/// Device settings, read once when streaming starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output rate in Hz (table 7 of the developer guide)
    pub output_rate_hz: u16,
    pub accel: AxisConfig,
    pub gyro: AxisConfig,
    pub mag: AxisConfig,
    /// Not sent; the device keeps its default range.
    pub accel_range_g: u16,
    /// Not sent; the device keeps its default range.
    pub gyro_range_dps: u16,
    /// Binary data mode (table 10)
    pub data_mode: u8,
    pub history_len: NonZeroUsize,
    /// How long `start` waits for the reply to the settings block
    pub reply_timeout_ms: u64,
    /// Log every decoded packet at debug level
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_rate_hz: 10,
            accel: AxisConfig::new(true, 200),
            gyro: AxisConfig::new(true, 200),
            mag: AxisConfig::new(true, 80),
            accel_range_g: 8,
            gyro_range_dps: 2000,
            data_mode: 1,
            history_len: history::DEFAULT_CAPACITY,
            reply_timeout_ms: 2000,
            debug: false,
        }
    }
}

impl SessionConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// The settings block written before [`STREAM_COMMAND`].
    pub fn settings_command(&self) -> String {
        let mut cmd = String::from("\r\n");
        let _ = write!(cmd, "RATE X 1 {}\r\n", self.output_rate_hz);
        for (axis, cfg) in [('A', self.accel), ('G', self.gyro), ('M', self.mag)] {
            let _ = write!(cmd, "RATE {axis} {} {}\r\n", cfg.enabled as u8, cfg.rate_hz);
        }
        let _ = write!(cmd, "DATAMODE {}\r\n", self.data_mode);
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Full path, or a fragment of the device name
    pub port: String,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "WAX9".to_string(),
            baud: 115200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wax9Config {
    pub session: SessionConfig,
    pub serial: SerialConfig,
}

impl Wax9Config {
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            tracing::info!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
