//! Package provisioning scoped to a single user.

use crate::channel::{CommandChannel, shell_quote};
use crate::context::ExecutionContext;
use crate::error::{HostError, Result};
use hostside_constants::markers;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A package file on the host and the package it installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Package name, e.g. `com.android.cts.deviceandprofileowner`.
    pub package: String,
    /// Path to the APK on the host.
    pub path: PathBuf,
}

impl Artifact {
    /// Creates a new artifact reference.
    pub fn new(package: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            path: path.into(),
        }
    }

    /// Resolves `file_name` inside `dir`.
    pub fn in_dir(package: impl Into<String>, dir: &Path, file_name: &str) -> Self {
        Self::new(package, dir.join(file_name))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| format!("{}.apk", self.package), |n| n.to_string_lossy().into_owned())
    }
}

/// A package installed into one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHandle {
    /// Package name.
    pub package: String,
    /// Artifact the package was installed from.
    pub artifact: PathBuf,
    /// Owning user id.
    pub user_id: u32,
}

/// Installs and uninstalls packages, tracking everything it installed.
pub struct PackageProvisioner {
    channel: Arc<dyn CommandChannel>,
    remote_tmp_dir: String,
    installed: Vec<PackageHandle>,
}

impl PackageProvisioner {
    /// Creates a new provisioner staging uploads in `remote_tmp_dir`.
    pub fn new(channel: Arc<dyn CommandChannel>, remote_tmp_dir: impl Into<String>) -> Self {
        Self {
            channel,
            remote_tmp_dir: remote_tmp_dir.into(),
            installed: Vec::new(),
        }
    }

    /// Returns the handles this provisioner is tracking.
    pub fn installed(&self) -> &[PackageHandle] {
        &self.installed
    }

    /// Installs `artifact` for `context` only.
    ///
    /// The handle is tracked as soon as the install is attempted, so a
    /// half-finished install is still cleaned up by
    /// [`uninstall_all`](Self::uninstall_all).
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Install`] if the artifact is missing, the context
    /// was removed, or the device rejects the package.
    pub async fn install(
        &mut self,
        artifact: &Artifact,
        context: &ExecutionContext,
    ) -> Result<PackageHandle> {
        if context.is_removed() {
            return Err(HostError::install(
                &artifact.package,
                format!("user {} was removed", context.id),
            ));
        }
        if !artifact.path.is_file() {
            return Err(HostError::install(
                &artifact.package,
                format!("artifact not found: {}", artifact.path.display()),
            ));
        }

        let handle = PackageHandle {
            package: artifact.package.clone(),
            artifact: artifact.path.clone(),
            user_id: context.id,
        };
        if !self.installed.contains(&handle) {
            self.installed.push(handle.clone());
        }

        let remote = format!(
            "{}/{}",
            self.remote_tmp_dir.trim_end_matches('/'),
            artifact.file_name()
        );
        self.channel.push(&artifact.path, &remote).await?;

        let command = format!("pm install -r -t --user {} {}", context.id, shell_quote(&remote));
        let output = self.channel.execute(&command).await;

        let cleanup = format!("rm -f {}", shell_quote(&remote));
        if let Err(e) = self.channel.execute(&cleanup).await {
            tracing::warn!(remote, error = %e, "failed to delete staged artifact");
        }

        let output = output?;
        if !output.trim_start().starts_with(markers::SUCCESS) {
            return Err(HostError::install(&artifact.package, output.trim()));
        }

        tracing::info!(package = %artifact.package, user_id = context.id, "installed package");
        Ok(handle)
    }

    /// Uninstalls a package from its user.
    ///
    /// A package that is not installed counts as uninstalled.
    pub async fn uninstall(&mut self, handle: &PackageHandle) -> Result<()> {
        let command = format!(
            "pm uninstall --user {} {}",
            handle.user_id,
            shell_quote(&handle.package)
        );
        let output = self.channel.execute(&command).await?;
        let reply = output.trim();

        if reply.starts_with(markers::SUCCESS) {
            tracing::info!(package = %handle.package, user_id = handle.user_id, "uninstalled package");
        } else if is_absent(reply) {
            tracing::debug!(package = %handle.package, user_id = handle.user_id, "package not installed");
        } else {
            return Err(HostError::install(&handle.package, reply));
        }

        self.installed.retain(|h| h != handle);
        Ok(())
    }

    /// Uninstalls every tracked package, newest first, ignoring failures.
    pub async fn uninstall_all(&mut self) {
        let handles = std::mem::take(&mut self.installed);
        for handle in handles.into_iter().rev() {
            if let Err(e) = self.uninstall(&handle).await {
                tracing::warn!(
                    package = %handle.package,
                    user_id = handle.user_id,
                    error = %e,
                    "failed to uninstall package"
                );
            }
        }
    }

    /// Returns true if `package` is installed for `context`.
    pub async fn is_installed(&self, package: &str, context: &ExecutionContext) -> Result<bool> {
        let command = format!("pm list packages --user {} {}", context.id, shell_quote(package));
        let output = self.channel.execute(&command).await?;
        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("package:"))
            .any(|name| name == package))
    }
}

fn is_absent(reply: &str) -> bool {
    reply.contains(markers::NOT_INSTALLED)
        || reply.contains(markers::DELETE_FAILED_INTERNAL_ERROR)
        || reply.contains(markers::UNKNOWN_USER)
}
