//! Device information.

use super::{OutputFormat, Session, print_json};
use anyhow::{Context, Result};
use clap::Subcommand;
use hostside_core::Device;
use serde::Serialize;

/// Device subcommands.
#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Show capabilities relevant to multi-user scenarios
    Info,
}

#[derive(Debug, Serialize)]
struct DeviceInfo {
    serial: Option<String>,
    api_level: u32,
    max_users: u32,
    current_user: u32,
    screen_size: String,
    features: Vec<String>,
}

/// Executes the device command.
pub async fn execute(session: &Session, cmd: DeviceCommands) -> Result<()> {
    match cmd {
        DeviceCommands::Info => execute_info(session).await,
    }
}

async fn execute_info(session: &Session) -> Result<()> {
    let device = Device::new(session.channel.clone());
    let info = DeviceInfo {
        serial: session.config.device.serial.clone(),
        api_level: device.api_level().await.context("Failed to read API level")?,
        max_users: device.max_users().await?,
        current_user: device.current_user().await?,
        screen_size: device.screen_size().await?.to_string(),
        features: device.features().await?.into_iter().collect(),
    };

    match session.format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Quiet => println!("{}", info.api_level),
        OutputFormat::Table => {
            println!("Serial:       {}", info.serial.as_deref().unwrap_or("(default)"));
            println!("API level:    {}", info.api_level);
            println!("Max users:    {}", info.max_users);
            println!("Current user: {}", info.current_user);
            println!("Screen size:  {}", info.screen_size);
            println!("Features:     {}", info.features.len());
            for feature in &info.features {
                println!("  {feature}");
            }
        }
    }
    Ok(())
}
