//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`HOSTSIDE_*`, nested keys separated by `__`)
//! 2. User configuration file (`~/.config/hostside/config.toml`)
//! 3. System configuration file (`/etc/hostside/config.toml`)
//! 4. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! [device]
//! adb_binary = "/opt/android-sdk/platform-tools/adb"
//! serial = "emulator-5554"
//! command_timeout_secs = 60
//! remote_tmp_dir = "/data/local/tmp"
//!
//! [instrumentation]
//! runner = "androidx.test.runner.AndroidJUnitRunner"
//! timeout_secs = 600
//!
//! [artifacts]
//! dir = "out/testcases"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! `HOSTSIDE_DEVICE__SERIAL=emulator-5556` overrides `device.serial`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use hostside_constants::{env, instrumentation};
use hostside_error::CommonError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device transport configuration.
    pub device: DeviceConfig,
    /// Instrumentation runner configuration.
    pub instrumentation: InstrumentationConfig,
    /// Test artifact location.
    pub artifacts: ArtifactConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<Self, CommonError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(system_config_path()))
                .merge(Toml::file(user_config_path()))
                .merge(Env::prefixed(env::CONFIG_PREFIX).split("__")),
        )
    }

    /// Loads configuration from a specific file, still honoring environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, CommonError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed(env::CONFIG_PREFIX).split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, CommonError> {
        let config: Self = figment
            .extract()
            .map_err(|e| CommonError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.device.command_timeout_secs == 0 {
            return Err(CommonError::config(
                "device.command_timeout_secs must be positive",
            ));
        }
        if self.instrumentation.timeout_secs == 0 {
            return Err(CommonError::config(
                "instrumentation.timeout_secs must be positive",
            ));
        }
        if self.instrumentation.runner.trim().is_empty() {
            return Err(CommonError::config("instrumentation.runner is empty"));
        }
        if !self.device.remote_tmp_dir.starts_with('/') {
            return Err(CommonError::config(format!(
                "device.remote_tmp_dir must be absolute, got {}",
                self.device.remote_tmp_dir
            )));
        }
        Ok(())
    }
}

/// Device transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Path to the `adb` binary.
    pub adb_binary: PathBuf,
    /// Device serial; `None` lets adb pick the only attached device.
    pub serial: Option<String>,
    /// Timeout for a single shell command.
    pub command_timeout_secs: u64,
    /// Staging directory for pushed artifacts.
    pub remote_tmp_dir: String,
}

impl DeviceConfig {
    /// Returns the per-command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_binary: PathBuf::from("adb"),
            serial: None,
            command_timeout_secs: 60,
            remote_tmp_dir: "/data/local/tmp".to_string(),
        }
    }
}

/// Instrumentation runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Runner class used when an invocation does not name one.
    pub runner: String,
    /// Timeout for one `am instrument` run.
    pub timeout_secs: u64,
}

impl InstrumentationConfig {
    /// Returns the per-run timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            runner: instrumentation::DEFAULT_RUNNER.to_string(),
            timeout_secs: 600,
        }
    }
}

/// Location of test artifacts on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory holding the test APKs.
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("testcases"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("hostside")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/hostside/config.toml")
}
