//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_LINE";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "serial-line.toml";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_LINE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
    /// 2. `./serial-line.toml` (current directory)
    /// 3. `config.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values; the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides that fail to parse are ignored here.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration back to the file it came from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.config_path.as_ref().ok_or(ConfigError::NoPath)?;
        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config directory for this tool, e.g. `~/.config/serial-line`.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serial-line").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file path inside [`get_default_config_dir`].
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(write_error)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, key)).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::env(format!("{}_{}", ENV_PREFIX, key), format!("Invalid {}", what)))
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `SERIAL_LINE_<SECTION>_<KEY>`, e.g.
/// `SERIAL_LINE_SERIAL_DEFAULT_BAUD=115200`. The testing section also
/// honours the legacy `TEST_PORT`, `TEST_BAUD` and `LOOPBACK_ENABLED`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(val) = env_var("SERIAL_DEFAULT_BAUD") {
        config.serial.default_baud = parse_env("SERIAL_DEFAULT_BAUD", &val, "baud rate")?;
    }
    if let Some(val) = env_var("SERIAL_READ_TIMEOUT_MS") {
        config.serial.read_timeout_ms = parse_env("SERIAL_READ_TIMEOUT_MS", &val, "timeout")?;
    }
    if let Some(val) = env_var("SERIAL_EOL") {
        config.serial.eol = val;
    }

    if let Some(val) = env_var("WAIT_DEFAULT_TIMEOUT_MS") {
        config.wait.default_timeout_ms = parse_env("WAIT_DEFAULT_TIMEOUT_MS", &val, "timeout")?;
    }

    if let Some(val) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    "Expected json, pretty or compact",
                ))
            }
        };
    }

    if let Some(val) = env_var("TESTING_PORT").or_else(|| std::env::var("TEST_PORT").ok()) {
        config.testing.port = Some(val);
    }
    if let Some(val) = env_var("TESTING_BAUD").or_else(|| std::env::var("TEST_BAUD").ok()) {
        config.testing.baud = parse_env("TESTING_BAUD", &val, "baud rate")?;
    }
    if let Ok(val) = std::env::var("LOOPBACK_ENABLED") {
        config.testing.loopback_enabled = val.eq_ignore_ascii_case("true") || val == "1";
    }

    Ok(())
}
