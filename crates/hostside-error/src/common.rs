//! Common error types shared across `hostside` crates.

use thiserror::Error;

/// Errors that occur across multiple `hostside` crates.
///
/// Crate-specific errors wrap this type with `#[from]`.
#[derive(Debug, Error)]
pub enum CommonError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A user, package or setting that does not exist on the target.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation was attempted on a resource in the wrong lifecycle state,
    /// e.g. starting a removed user.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl CommonError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Creates a new invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is an invalid state error.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}
