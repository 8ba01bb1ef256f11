//! Configuration module for serial-line.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial-line.toml` (current directory)
//! 3. `config.toml` in the platform config directory
//!    (`~/.config/serial-line/` on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_LINE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_LINE_SERIAL_DEFAULT_BAUD=115200`
//! - `SERIAL_LINE_SERIAL_EOL=";"`
//! - `SERIAL_LINE_LOGGING_FORMAT=json`
//!
//! Hardware tests also accept `TEST_PORT`, `TEST_BAUD` and `LOOPBACK_ENABLED`.
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Default baud: {}", config.serial.default_baud);
//! # Ok::<(), serial_line::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, LogFormat, LoggingConfig, SerialConfig, TestingConfig, TransferConfig, WaitConfig,
};
