//! Device-wide queries: capabilities, display and lock state.

use crate::channel::CommandChannel;
use crate::context::ExecutionContext;
use crate::error::{HostError, Result};
use hostside_constants::markers;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Something a scenario may require of the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// More than one user can exist.
    MultipleUsers,
    /// Managed profiles can be created.
    ManagedProfiles,
    /// A `pm list features` entry is present.
    Feature(String),
    /// The platform API level is at least this.
    MinApiLevel(u32),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleUsers => write!(f, "multi-user support"),
            Self::ManagedProfiles => write!(f, "managed profile support"),
            Self::Feature(name) => write!(f, "feature {name}"),
            Self::MinApiLevel(level) => write!(f, "API level {level}"),
        }
    }
}

/// Display size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read-only queries against the target.
#[derive(Clone)]
pub struct Device {
    channel: Arc<dyn CommandChannel>,
}

impl Device {
    /// Creates a new device handle.
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// Returns the channel this device talks through.
    pub fn channel(&self) -> &Arc<dyn CommandChannel> {
        &self.channel
    }

    /// Maximum number of users the target supports.
    ///
    /// Unparseable replies count as zero, i.e. no multi-user support.
    pub async fn max_users(&self) -> Result<u32> {
        let output = self.channel.execute("pm get-max-users").await?;
        match last_number(&output) {
            Some(max) => Ok(max),
            None => {
                tracing::warn!(output = output.trim(), "could not parse max users");
                Ok(0)
            }
        }
    }

    /// Returns true if more than one user can exist.
    pub async fn supports_multiple_users(&self) -> Result<bool> {
        Ok(self.max_users().await? > 1)
    }

    /// Lists the feature flags the target advertises.
    pub async fn features(&self) -> Result<BTreeSet<String>> {
        let output = self.channel.execute("pm list features").await?;
        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("feature:"))
            .map(|feature| {
                // `feature:name=version` on newer releases.
                feature.split('=').next().unwrap_or(feature).to_string()
            })
            .collect())
    }

    /// Returns true if `feature` is advertised.
    pub async fn has_feature(&self, feature: &str) -> Result<bool> {
        Ok(self.features().await?.contains(feature))
    }

    /// Platform API level.
    pub async fn api_level(&self) -> Result<u32> {
        let command = "getprop ro.build.version.sdk";
        let output = self.channel.execute(command).await?;
        output
            .trim()
            .parse()
            .map_err(|_| HostError::malformed(command, format!("not an API level: {}", output.trim())))
    }

    /// Current foreground user id.
    pub async fn current_user(&self) -> Result<u32> {
        let command = "am get-current-user";
        let output = self.channel.execute(command).await?;
        output
            .trim()
            .parse()
            .map_err(|_| HostError::malformed(command, format!("not a user id: {}", output.trim())))
    }

    /// Returns true if the target provides `capability`.
    pub async fn supports(&self, capability: &Capability) -> Result<bool> {
        match capability {
            Capability::MultipleUsers => self.supports_multiple_users().await,
            Capability::ManagedProfiles => {
                Ok(self.supports_multiple_users().await?
                    && self.has_feature(markers::FEATURE_MANAGED_USERS).await?)
            }
            Capability::Feature(name) => self.has_feature(name).await,
            Capability::MinApiLevel(level) => Ok(self.api_level().await? >= *level),
        }
    }

    /// Effective display size; an override size wins over the panel size.
    pub async fn screen_size(&self) -> Result<ScreenSize> {
        let command = "wm size";
        let output = self.channel.execute(command).await?;
        parse_screen_size(&output)
            .ok_or_else(|| HostError::malformed(command, format!("no size in: {}", output.trim())))
    }

    /// Verifies the lock credential of `context`.
    ///
    /// Returns true only if the device confirmed the credential.
    pub async fn verify_lock_credential(
        &self,
        context: &ExecutionContext,
        credential: Option<&str>,
    ) -> Result<bool> {
        let mut command = format!("cmd lock_settings verify --user {}", context.id);
        if let Some(credential) = credential {
            command.push_str(" --old ");
            command.push_str(&crate::channel::shell_quote(credential));
        }
        let output = self.channel.execute(&command).await?;
        Ok(output.contains(markers::LOCK_VERIFIED))
    }
}

fn last_number(output: &str) -> Option<u32> {
    output.split_whitespace().last()?.parse().ok()
}

/// Parses `wm size`:
///
/// ```text
/// Physical size: 1080x2340
/// Override size: 720x1560
/// ```
fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    let find = |prefix: &str| {
        output.lines().find_map(|line| {
            let (width, height) = line.trim().strip_prefix(prefix)?.trim().split_once('x')?;
            Some(ScreenSize {
                width: width.trim().parse().ok()?,
                height: height.trim().parse().ok()?,
            })
        })
    };
    find(markers::OVERRIDE_SIZE).or_else(|| find(markers::PHYSICAL_SIZE))
}
