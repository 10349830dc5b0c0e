//! Command channel to the remote target.
//!
//! The core never talks to a device directly. Every user, package, settings
//! and instrumentation operation is a pre-formatted shell command handed to a
//! [`CommandChannel`], and every reply is raw text the caller parses.

mod adb;

pub use adb::AdbChannel;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Executes shell commands on a remote target.
///
/// Implementations own transport concerns: connection, retries and timeouts.
/// Anything that prevents a reply from being delivered is reported as
/// [`HostError::Transport`](crate::HostError::Transport); a command that ran
/// and printed an error is a successful call.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Runs `command` in a shell on the target and returns its output.
    async fn execute(&self, command: &str) -> Result<String>;

    /// Runs `command` with a longer or shorter deadline than the channel
    /// default.
    async fn execute_with_timeout(&self, command: &str, timeout: Duration) -> Result<String> {
        let _ = timeout;
        self.execute(command).await
    }

    /// Copies a host file onto the target.
    async fn push(&self, local: &Path, remote: &str) -> Result<()>;
}

/// Quotes `arg` for the target's POSIX shell.
///
/// Arguments made only of unambiguous characters pass through unchanged.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
