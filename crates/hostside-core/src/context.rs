//! User and profile execution contexts.
//!
//! A context is a user on the target under which packages are installed and
//! procedures run. [`UserContextManager`] owns every context it creates and
//! can always tear them down again, even after a failed scenario.

use crate::channel::CommandChannel;
use crate::device::{Capability, Device};
use crate::error::{HostError, Result};
use hostside_constants::markers;
use hostside_error::CommonError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// The foreground user that exists before any scenario runs.
    Primary,
    /// A full secondary user.
    Secondary,
    /// A guest user.
    Guest,
    /// A managed (work) profile attached to `parent`.
    ManagedProfile {
        /// User id owning the profile.
        parent: u32,
    },
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::Guest => write!(f, "guest"),
            Self::ManagedProfile { parent } => write!(f, "managed profile of {parent}"),
        }
    }
}

/// Lifecycle state of a context.
///
/// `Created -> Started -> Removed`; `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Allocated on the target but not running.
    Created,
    /// Running; procedures may execute.
    Started,
    /// Deleted from the target.
    Removed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// State cell shared by every clone of one context.
///
/// A clone held by a [`ProcedureInvocation`](crate::runner::ProcedureInvocation)
/// or by a caller observes transitions made through the manager's copy.
#[derive(Clone)]
struct SharedState(Arc<RwLock<ContextState>>);

impl SharedState {
    fn new(state: ContextState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    fn get(&self) -> ContextState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ContextState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}

impl PartialEq for SharedState {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for SharedState {}

impl Serialize for SharedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        ContextState::deserialize(deserializer).map(Self::new)
    }
}

/// A user or profile on the target.
///
/// Clones share their state: once the manager starts or removes a context,
/// every copy of it reports the new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// User id.
    pub id: u32,
    /// Serial number, stable across reboots unlike `id` reuse.
    pub serial: u32,
    /// Display name given at creation.
    pub name: String,
    /// Kind of context.
    pub kind: ContextKind,
    state: SharedState,
}

impl ExecutionContext {
    pub(crate) fn new(
        id: u32,
        serial: u32,
        name: impl Into<String>,
        kind: ContextKind,
        state: ContextState,
    ) -> Self {
        Self {
            id,
            serial,
            name: name.into(),
            kind,
            state: SharedState::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    /// Returns true if procedures may run in this context.
    pub fn is_started(&self) -> bool {
        self.state() == ContextState::Started
    }

    /// Returns true if the context has been removed.
    pub fn is_removed(&self) -> bool {
        self.state() == ContextState::Removed
    }

    fn set_state(&self, state: ContextState) {
        self.state.set(state);
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {} ({}, {})", self.id, self.kind, self.state())
    }
}

/// One row of `pm list users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User id.
    pub id: u32,
    /// User name.
    pub name: String,
    /// `UserInfo` flag bits.
    pub flags: u32,
    /// Whether the user is running.
    pub running: bool,
}

impl UserInfo {
    /// Returns true if the primary flag is set.
    pub fn is_primary(&self) -> bool {
        self.flags & markers::FLAG_PRIMARY != 0
    }

    /// Returns true if the managed profile flag is set.
    pub fn is_managed_profile(&self) -> bool {
        self.flags & markers::FLAG_MANAGED_PROFILE != 0
    }

    /// Returns true if the guest flag is set.
    pub fn is_guest(&self) -> bool {
        self.flags & markers::FLAG_GUEST != 0
    }
}

/// Creates, starts and removes execution contexts on the target.
pub struct UserContextManager {
    channel: Arc<dyn CommandChannel>,
    device: Device,
    /// Contexts created by this manager, in creation order.
    live: Vec<ExecutionContext>,
}

impl UserContextManager {
    /// Creates a new manager.
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            device: Device::new(Arc::clone(&channel)),
            channel,
            live: Vec::new(),
        }
    }

    /// Returns the contexts this manager currently owns.
    pub fn live(&self) -> &[ExecutionContext] {
        &self.live
    }

    /// Returns the ids of the contexts this manager currently owns.
    pub fn live_ids(&self) -> Vec<u32> {
        self.live.iter().map(|c| c.id).collect()
    }

    /// Returns the current foreground user as a started, untracked context.
    pub async fn primary(&self) -> Result<ExecutionContext> {
        let id = self.device.current_user().await?;
        Ok(ExecutionContext::new(
            id,
            self.serial_number(id).await?,
            format!("user {id}"),
            ContextKind::Primary,
            ContextState::Started,
        ))
    }

    /// Wraps a user that already exists on the target.
    ///
    /// The context is not tracked, so [`remove_all`](Self::remove_all) leaves
    /// it alone. Managed profiles are attributed to the current foreground
    /// user since `pm list users` does not name the parent.
    pub async fn adopt(&self, user_id: u32) -> Result<ExecutionContext> {
        let info = self
            .list_users()
            .await?
            .into_iter()
            .find(|user| user.id == user_id)
            .ok_or_else(|| CommonError::not_found(format!("user {user_id}")))?;

        let kind = if info.is_primary() {
            ContextKind::Primary
        } else if info.is_managed_profile() {
            ContextKind::ManagedProfile {
                parent: self.device.current_user().await?,
            }
        } else if info.is_guest() {
            ContextKind::Guest
        } else {
            ContextKind::Secondary
        };

        let state = if info.running {
            ContextState::Started
        } else {
            ContextState::Created
        };
        Ok(ExecutionContext::new(
            info.id,
            self.serial_number(info.id).await?,
            info.name,
            kind,
            state,
        ))
    }

    /// Lists every user on the target.
    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        let command = "pm list users";
        let output = self.channel.execute(command).await?;
        parse_user_list(&output).map_err(|detail| HostError::malformed(command, detail))
    }

    /// Creates a new context in the `Created` state.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnsupportedOperation`] if the target cannot host
    /// another context of this kind.
    pub async fn create(&mut self, kind: ContextKind) -> Result<ExecutionContext> {
        let required = match kind {
            ContextKind::Primary => {
                return Err(HostError::unsupported(
                    "the primary user always exists; use primary()",
                ));
            }
            ContextKind::Secondary | ContextKind::Guest => Capability::MultipleUsers,
            ContextKind::ManagedProfile { .. } => Capability::ManagedProfiles,
        };
        if !self.device.supports(&required).await? {
            return Err(HostError::unsupported(format!(
                "target lacks {required}, cannot create {kind} user"
            )));
        }

        let name = format!("hostside_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let command = match kind {
            ContextKind::Guest => format!("pm create-user --guest {name}"),
            ContextKind::ManagedProfile { parent } => {
                format!("pm create-user --profileOf {parent} --managed {name}")
            }
            _ => format!("pm create-user {name}"),
        };

        let output = self.channel.execute(&command).await?;
        let id = parse_created_user(&output).ok_or_else(|| HostError::remote(&command, &output))?;

        // Tracked before the serial lookup so a failed lookup cannot leak the user.
        self.live
            .push(ExecutionContext::new(id, 0, name, kind, ContextState::Created));
        let serial = self.serial_number(id).await?;

        let mut context = self.live[self.live.len() - 1].clone();
        context.serial = serial;
        self.track(&context);
        tracing::info!(user_id = id, serial, %kind, "created context");
        Ok(context)
    }

    /// Starts a context. Starting a started context is a no-op.
    pub async fn start(&mut self, context: &mut ExecutionContext) -> Result<()> {
        match context.state() {
            ContextState::Started => return Ok(()),
            ContextState::Removed => {
                return Err(HostError::invalid_state(format!(
                    "cannot start removed user {}",
                    context.id
                )));
            }
            ContextState::Created => {}
        }

        let command = format!("am start-user -w {}", context.id);
        let output = self.channel.execute(&command).await?;
        if output.trim_start().starts_with(markers::ERROR) {
            return Err(HostError::remote(command, output));
        }

        context.set_state(ContextState::Started);
        tracing::info!(user_id = context.id, "started context");
        Ok(())
    }

    /// Stops and deletes a context.
    ///
    /// Removing a context that is already gone, on the target or locally, is
    /// a no-op.
    pub async fn remove(&mut self, context: &mut ExecutionContext) -> Result<()> {
        if context.kind == ContextKind::Primary {
            return Err(HostError::unsupported("refusing to remove the primary user"));
        }
        if context.is_removed() {
            self.forget(context.id);
            return Ok(());
        }

        let stop = format!("am stop-user -w -f {}", context.id);
        if let Err(e) = self.channel.execute(&stop).await {
            tracing::warn!(user_id = context.id, error = %e, "stop-user failed, removing anyway");
        }

        let command = format!("pm remove-user {}", context.id);
        let output = self.channel.execute(&command).await?;
        if output.trim_start().starts_with(markers::ERROR) {
            let still_present = self
                .list_users()
                .await?
                .iter()
                .any(|user| user.id == context.id);
            if still_present {
                return Err(HostError::remote(command, output));
            }
            tracing::debug!(user_id = context.id, "user already gone");
        }

        context.set_state(ContextState::Removed);
        self.forget(context.id);
        tracing::info!(user_id = context.id, "removed context");
        Ok(())
    }

    /// Removes every context this manager created, newest first.
    ///
    /// Individual failures are logged and skipped; afterwards the manager owns
    /// nothing.
    pub async fn remove_all(&mut self) {
        let contexts = std::mem::take(&mut self.live);
        for mut context in contexts.into_iter().rev() {
            if let Err(e) = self.remove(&mut context).await {
                tracing::warn!(user_id = context.id, error = %e, "failed to remove context");
            }
        }
    }

    async fn serial_number(&self, user_id: u32) -> Result<u32> {
        let command = "dumpsys user";
        let output = self.channel.execute(command).await?;
        parse_serial_number(&output, user_id).ok_or_else(|| {
            HostError::malformed(command, format!("no serial number for user {user_id}"))
        })
    }

    fn track(&mut self, context: &ExecutionContext) {
        if let Some(record) = self.live.iter_mut().find(|c| c.id == context.id) {
            record.serial = context.serial;
        }
    }

    fn forget(&mut self, user_id: u32) {
        self.live.retain(|c| c.id != user_id);
    }
}

/// Parses `Success: created user id <N>`.
fn parse_created_user(output: &str) -> Option<u32> {
    let output = output.trim();
    if !output.starts_with(markers::SUCCESS) {
        return None;
    }
    output.rsplit(' ').next()?.trim().parse().ok()
}

/// Finds `UserInfo{<id>:...} serialNo=<serial>` in `dumpsys user` output.
fn parse_serial_number(output: &str, user_id: u32) -> Option<u32> {
    output.lines().find_map(|line| {
        let info = user_info_body(line)?;
        let id: u32 = info.split(':').next()?.parse().ok()?;
        if id != user_id {
            return None;
        }
        let serial = line.split("serialNo=").nth(1)?;
        serial
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()
    })
}

/// Parses `pm list users`.
///
/// ```text
/// Users:
///     UserInfo{0:Owner:c13} running
///     UserInfo{10:Work profile:1030}
/// ```
fn parse_user_list(output: &str) -> std::result::Result<Vec<UserInfo>, String> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some(markers::USERS_HEADER) {
        return Err("missing `Users:` header".to_string());
    }

    lines
        .map(|line| {
            let body =
                user_info_body(line).ok_or_else(|| format!("unexpected user line: {line}"))?;
            let (id, rest) = body
                .split_once(':')
                .ok_or_else(|| format!("missing user id: {line}"))?;
            let (name, flags) = rest
                .rsplit_once(':')
                .ok_or_else(|| format!("missing user flags: {line}"))?;
            let close = line.rfind('}').unwrap_or(line.len());
            Ok(UserInfo {
                id: id.parse().map_err(|_| format!("bad user id: {line}"))?,
                name: name.to_string(),
                flags: u32::from_str_radix(flags, 16).map_err(|_| format!("bad flags: {line}"))?,
                running: line[close..].contains("running"),
            })
        })
        .collect()
}

fn user_info_body(line: &str) -> Option<&str> {
    let start = line.find("UserInfo{")? + "UserInfo{".len();
    let end = start + line[start..].find('}')?;
    Some(&line[start..end])
}
