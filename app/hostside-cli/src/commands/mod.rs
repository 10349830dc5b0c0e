//! CLI command implementations.
//!
//! Commands are organized into:
//!
//! - User and profile management
//! - Package install and uninstall
//! - Procedure execution with optional event checks
//! - Device information

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hostside_core::{AdbChannel, CommandChannel, Config};
use std::path::PathBuf;
use std::sync::Arc;

pub mod device;
pub mod packages;
pub mod run;
pub mod users;

/// hostside - run device test procedures inside throwaway users
#[derive(Parser)]
#[command(name = "hostside")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Device serial (overrides configuration)
    #[arg(short, long, global = true, env = "ANDROID_SERIAL")]
    pub serial: Option<String>,

    /// Path to the adb binary (overrides configuration)
    #[arg(long, global = true)]
    pub adb: Option<PathBuf>,

    /// Configuration file to load instead of the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// Quiet mode (IDs only)
    Quiet,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage users and profiles
    #[command(subcommand)]
    Users(users::UserCommands),

    /// Install a package into one user
    Install(packages::InstallArgs),

    /// Uninstall a package from one user
    Uninstall(packages::UninstallArgs),

    /// Run an instrumentation procedure
    Run(run::RunArgs),

    /// Query the device
    #[command(subcommand)]
    Device(device::DeviceCommands),
}

/// Resolved configuration and an open channel to the device.
pub struct Session {
    pub config: Config,
    pub channel: Arc<dyn CommandChannel>,
    pub format: OutputFormat,
}

impl Session {
    /// Loads configuration, applies command-line overrides and opens the
    /// channel.
    pub fn open(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::load().context("Failed to load configuration")?,
        };
        if let Some(serial) = &cli.serial {
            config.device.serial = Some(serial.clone());
        }
        if let Some(adb) = &cli.adb {
            config.device.adb_binary = adb.clone();
        }
        config.validate().context("Invalid configuration")?;

        let channel = AdbChannel::from_config(&config.device);
        Ok(Self {
            channel: Arc::new(channel),
            format: cli.format,
            config,
        })
    }

    #[cfg(test)]
    pub fn with_channel(channel: Arc<dyn CommandChannel>, format: OutputFormat) -> Self {
        Self {
            config: Config::default(),
            channel,
            format,
        }
    }
}

/// Parses `key=value`.
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=value: empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Prints `value` as pretty JSON.
pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
