//! `adb`-backed command channel.

use super::CommandChannel;
use crate::config::DeviceConfig;
use crate::error::{HostError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Command channel that shells out to the `adb` host binary.
#[derive(Debug, Clone)]
pub struct AdbChannel {
    /// Path to the adb binary.
    binary: PathBuf,
    /// Target serial (`adb -s`).
    serial: Option<String>,
    /// Default per-command timeout.
    timeout: Duration,
}

impl AdbChannel {
    /// Creates a new adb channel.
    pub fn new(binary: impl Into<PathBuf>, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            serial,
            timeout,
        }
    }

    /// Creates a channel from device configuration.
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            &config.adb_binary,
            config.serial.clone(),
            config.command_timeout(),
        )
    }

    /// Returns the target serial, if one was pinned.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref serial) = self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str, timeout: Duration) -> Result<Output> {
        tracing::debug!(command = what, "adb");
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(HostError::transport(format!(
                "failed to run {}: {e}",
                self.binary.display()
            ))),
            Err(_) => Err(HostError::transport(format!(
                "`{what}` timed out after {timeout:?}"
            ))),
        }
    }
}

#[async_trait]
impl CommandChannel for AdbChannel {
    async fn execute(&self, command: &str) -> Result<String> {
        self.execute_with_timeout(command, self.timeout).await
    }

    async fn execute_with_timeout(&self, command: &str, timeout: Duration) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("shell").arg(command);

        let output = self.run(cmd, command, timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Remote commands may exit non-zero and still carry a reply the caller
        // must parse; only adb's own diagnostics mean nothing was delivered.
        if !output.status.success() && is_adb_diagnostic(&stderr) {
            return Err(HostError::transport(stderr.trim().to_string()));
        }

        let mut reply = stdout.into_owned();
        if !stderr.trim().is_empty() {
            reply.push_str(&stderr);
        }
        Ok(reply)
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("push").arg(local).arg(remote);

        let what = format!("push {} {remote}", local.display());
        let output = self.run(cmd, &what, self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostError::transport(format!(
                "{what} failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn is_adb_diagnostic(stderr: &str) -> bool {
    let stderr = stderr.trim_start();
    stderr.starts_with("error:") || stderr.starts_with("adb: ")
}
