//! Configuration schema definitions.
//!
//! Every section has serde defaults, so a config file only needs the keys
//! it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::serial::TransferOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub wait: WaitConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
    /// Hardware loopback test settings
    pub testing: TestingConfig,
}

impl Config {
    /// Check values serde cannot constrain on its own.
    pub fn validate(&self) -> ConfigResult<()> {
        self.serial.eol_byte()?;
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::invalid(
                "transfer.chunk_size",
                "must be greater than zero",
            ));
        }
        if self.serial.default_baud == 0 {
            return Err(ConfigError::invalid("serial.default_baud", "must be non-zero"));
        }
        Ok(())
    }
}

/// Serial port section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when the command line does not give one
    pub default_baud: u32,
    /// Upper bound for a single transport read
    pub read_timeout_ms: u64,
    /// End-of-line delimiter; must be exactly one byte
    pub eol: String,
    /// Short names for device paths, e.g. `modem = "/dev/ttyUSB0"`
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 9600,
            read_timeout_ms: 100,
            eol: "\n".to_string(),
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// The configured delimiter as a byte.
    pub fn eol_byte(&self) -> ConfigResult<u8> {
        match self.eol.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(ConfigError::invalid(
                "serial.eol",
                format!("must be exactly one byte, got {:?}", self.eol),
            )),
        }
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Pattern wait section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub default_timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 1000,
        }
    }
}

impl WaitConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// File transfer pacing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub chunk_pause_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let defaults = TransferOptions::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_pause_ms: defaults.chunk_pause.as_millis() as u64,
        }
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_pause: Duration::from_millis(config.chunk_pause_ms),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or "serial_line=debug"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

/// Hardware testing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingConfig {
    /// Device with TX wired to RX
    pub port: Option<String>,
    pub baud: u32,
    pub loopback_enabled: bool,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            loopback_enabled: false,
        }
    }
}
