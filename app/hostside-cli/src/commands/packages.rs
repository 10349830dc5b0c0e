//! Package install and uninstall commands.

use super::Session;
use anyhow::{Context, Result};
use clap::Args;
use hostside_core::{Artifact, PackageHandle, PackageProvisioner, UserContextManager};
use std::path::PathBuf;

#[derive(Args)]
pub struct InstallArgs {
    /// APK to install; relative paths are resolved against the artifact
    /// directory if they do not exist as given
    pub apk: PathBuf,
    /// Package name the APK installs
    #[arg(long)]
    pub package: String,
    /// Target user id (defaults to the current foreground user)
    #[arg(long)]
    pub user: Option<u32>,
}

#[derive(Args)]
pub struct UninstallArgs {
    /// Package name
    pub package: String,
    /// Target user id (defaults to the current foreground user)
    #[arg(long)]
    pub user: Option<u32>,
}

/// Installs an APK into one user.
pub async fn execute_install(session: &Session, args: InstallArgs) -> Result<()> {
    let contexts = UserContextManager::new(session.channel.clone());
    let context = match args.user {
        Some(id) => contexts.adopt(id).await?,
        None => contexts.primary().await?,
    };

    let path = if args.apk.is_relative() && !args.apk.exists() {
        session.config.artifacts.dir.join(&args.apk)
    } else {
        args.apk.clone()
    };
    let artifact = Artifact::new(&args.package, path);

    let mut packages =
        PackageProvisioner::new(session.channel.clone(), &session.config.device.remote_tmp_dir);
    let handle = packages
        .install(&artifact, &context)
        .await
        .with_context(|| format!("Failed to install {}", args.apk.display()))?;

    println!("Installed {} for user {}", handle.package, handle.user_id);
    Ok(())
}

/// Uninstalls a package from one user.
pub async fn execute_uninstall(session: &Session, args: UninstallArgs) -> Result<()> {
    let user_id = match args.user {
        Some(id) => id,
        None => UserContextManager::new(session.channel.clone())
            .primary()
            .await?
            .id,
    };
    let handle = PackageHandle {
        package: args.package.clone(),
        artifact: PathBuf::new(),
        user_id,
    };

    let mut packages =
        PackageProvisioner::new(session.channel.clone(), &session.config.device.remote_tmp_dir);
    packages
        .uninstall(&handle)
        .await
        .with_context(|| format!("Failed to uninstall {}", args.package))?;

    println!("Uninstalled {} for user {user_id}", args.package);
    Ok(())
}
