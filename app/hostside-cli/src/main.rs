//! hostside CLI - drive users, packages and instrumentation on a device.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands, Session};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::open(&cli)?;

    let level = if cli.debug {
        "debug"
    } else {
        session.config.logging.level.as_str()
    };
    let filter = format!("hostside_core={level},hostside_cli={level}");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::debug!(serial = ?session.config.device.serial, "opened adb channel");
    match cli.command {
        Commands::Users(cmd) => commands::users::execute(&session, cmd).await,
        Commands::Install(args) => commands::packages::execute_install(&session, args).await,
        Commands::Uninstall(args) => commands::packages::execute_uninstall(&session, args).await,
        Commands::Run(args) => commands::run::execute(&session, args).await,
        Commands::Device(cmd) => commands::device::execute(&session, cmd).await,
    }
}
