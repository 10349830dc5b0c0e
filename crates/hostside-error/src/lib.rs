//! Common error types for `hostside`.
//!
//! Errors that are not specific to device orchestration, such as bad
//! configuration or a lookup that found nothing, live here so that every
//! crate in the workspace reports them the same way.
//!
//! # Usage
//!
//! ```rust
//! use hostside_error::CommonError;
//!
//! fn lookup(user_id: u32) -> Result<(), CommonError> {
//!     Err(CommonError::not_found(format!("user {user_id}")))
//! }
//! # assert!(lookup(10).unwrap_err().is_not_found());
//! ```
//!
//! # Crate-Specific Errors
//!
//! Crate errors wrap `CommonError` transparently:
//!
//! ```rust,ignore
//! use hostside_error::CommonError;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum HostError {
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//!
//!     #[error("transport error: {0}")]
//!     Transport(String),
//! }
//! ```

mod common;

pub use common::CommonError;

/// Result type alias using `CommonError`.
pub type Result<T> = std::result::Result<T, CommonError>;
