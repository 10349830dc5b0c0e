//! Settings provider access with restore-on-teardown.

use crate::channel::{CommandChannel, shell_quote};
use crate::error::{HostError, Result};
use hostside_constants::{markers, settings};
use std::fmt;
use std::sync::Arc;

/// Settings namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// Per-user system settings.
    System,
    /// Per-user secure settings.
    Secure,
    /// Device-wide settings.
    Global,
}

impl Namespace {
    /// Returns the namespace as passed to `settings`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => settings::SYSTEM,
            Self::Secure => settings::SECURE,
            Self::Global => settings::GLOBAL,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            settings::SYSTEM => Ok(Self::System),
            settings::SECURE => Ok(Self::Secure),
            settings::GLOBAL => Ok(Self::Global),
            other => Err(HostError::Common(hostside_error::CommonError::not_found(
                format!("settings namespace {other}"),
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct SavedSetting {
    namespace: Namespace,
    key: String,
    user: Option<u32>,
    original: Option<String>,
}

/// Reads and writes settings, remembering the first value each write
/// replaced so it can be put back.
pub struct Settings {
    channel: Arc<dyn CommandChannel>,
    saved: Vec<SavedSetting>,
}

impl Settings {
    /// Creates a new settings handle.
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            channel,
            saved: Vec::new(),
        }
    }

    /// Reads a setting; unset keys are `None`.
    pub async fn get(
        &self,
        namespace: Namespace,
        key: &str,
        user: Option<u32>,
    ) -> Result<Option<String>> {
        let command = format!("settings{} get {namespace} {}", user_flag(user), shell_quote(key));
        let output = self.channel.execute(&command).await?;
        check_reply(&command, &output)?;
        let value = output.trim();
        if value == settings::NULL {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    /// Writes a setting, saving the value it replaces the first time the key
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::RemoteCommand`] if the device rejects the write.
    pub async fn put(
        &mut self,
        namespace: Namespace,
        key: &str,
        value: &str,
        user: Option<u32>,
    ) -> Result<()> {
        let seen = self
            .saved
            .iter()
            .any(|s| s.namespace == namespace && s.key == key && s.user == user);
        let original = if seen {
            None
        } else {
            Some(self.get(namespace, key, user).await?)
        };

        self.write(namespace, key, Some(value), user).await?;

        // A rejected write changed nothing, so only applied writes are saved.
        if let Some(original) = original {
            self.saved.push(SavedSetting {
                namespace,
                key: key.to_string(),
                user,
                original,
            });
        }
        Ok(())
    }

    /// Puts back every saved value, newest first. Failures are logged and
    /// skipped.
    pub async fn restore_all(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        for setting in saved.into_iter().rev() {
            let result = self
                .write(
                    setting.namespace,
                    &setting.key,
                    setting.original.as_deref(),
                    setting.user,
                )
                .await;
            if let Err(e) = result {
                tracing::warn!(
                    namespace = %setting.namespace,
                    key = %setting.key,
                    error = %e,
                    "failed to restore setting"
                );
            }
        }
    }

    async fn write(
        &self,
        namespace: Namespace,
        key: &str,
        value: Option<&str>,
        user: Option<u32>,
    ) -> Result<()> {
        let command = match value {
            Some(value) => format!(
                "settings{} put {namespace} {} {}",
                user_flag(user),
                shell_quote(key),
                shell_quote(value)
            ),
            None => format!("settings{} delete {namespace} {}", user_flag(user), shell_quote(key)),
        };
        tracing::debug!(%command, "writing setting");
        let output = self.channel.execute(&command).await?;
        check_reply(&command, &output)
    }
}

/// The settings tool exits 0 and prints the exception when the provider
/// refuses a call.
fn check_reply(command: &str, output: &str) -> Result<()> {
    let reply = output.trim_start();
    if reply.starts_with(settings::EXCEPTION)
        || reply.starts_with(settings::INVALID_NAMESPACE)
        || reply.starts_with(markers::ERROR)
    {
        return Err(HostError::remote(command, output));
    }
    Ok(())
}

fn user_flag(user: Option<u32>) -> String {
    user.map(|id| format!(" --user {id}")).unwrap_or_default()
}
