//! Error types for the orchestration core.

use crate::context::ContextState;
use crate::event::Event;
use hostside_error::CommonError;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while driving a remote device.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration, lookup and lifecycle errors shared with other crates.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// The command channel could not deliver a command or its reply.
    #[error("transport error: {0}")]
    Transport(String),

    /// The target lacks a capability the operation needs.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A package could not be installed or uninstalled.
    #[error("install error for {package}: {reason}")]
    Install {
        /// Package being provisioned.
        package: String,
        /// Reply from the device or host-side cause.
        reason: String,
    },

    /// A procedure targeted a user that is not running.
    #[error("context {user_id} is not ready (state: {state})")]
    ContextNotReady {
        /// Target user id.
        user_id: u32,
        /// State the context was found in.
        state: ContextState,
    },

    /// The named instrumentation is not installed on the target.
    #[error("procedure not found: {0}")]
    ProcedureNotFound(String),

    /// A procedure ran and reported failure.
    #[error("procedure {procedure} failed in user {user_id}: {detail}")]
    ProcedureFailed {
        /// `package/Class#method` of the procedure.
        procedure: String,
        /// User the procedure ran in.
        user_id: u32,
        /// First failure message reported by the device.
        detail: String,
    },

    /// Emitted events differ from the expected set.
    #[error(
        "event mismatch: missing [{}], unexpected [{}]",
        join_events(.missing),
        join_events(.unexpected)
    )]
    EventMismatch {
        /// Expected events that were not emitted.
        missing: Vec<Event>,
        /// Emitted events that were not expected.
        unexpected: Vec<Event>,
    },

    /// A remote command replied with an error.
    #[error("`{command}` failed: {output}")]
    RemoteCommand {
        /// The command that was sent.
        command: String,
        /// Trimmed reply.
        output: String,
    },

    /// A reply could not be parsed.
    #[error("malformed reply to `{command}`: {detail}")]
    MalformedOutput {
        /// The command that was sent.
        command: String,
        /// What was wrong with the reply.
        detail: String,
    },
}

impl HostError {
    /// Creates a new transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new unsupported operation error.
    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Creates a new install error.
    #[must_use]
    pub fn install(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Install {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new remote command error.
    #[must_use]
    pub fn remote(command: impl Into<String>, output: impl AsRef<str>) -> Self {
        Self::RemoteCommand {
            command: command.into(),
            output: output.as_ref().trim().to_string(),
        }
    }

    /// Creates a new malformed output error.
    #[must_use]
    pub fn malformed(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedOutput {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Creates a new invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::Common(CommonError::invalid_state(msg))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is an unsupported operation error.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }
}

fn join_events(events: &[Event]) -> String {
    events
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
