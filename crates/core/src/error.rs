//! Error taxonomy shared by every crate in the workspace.
//!
//! Mirrors the teacher's `AgentError` pattern: one variant per failure
//! class, `#[error("...")]` messages, and `From` impls so call sites can
//! use `?` without manual wrapping.

use thiserror::Error;

/// Errors surfaced by the core types, the memory tiers, and the session
/// backends. Distinguishes the taxonomy from §7: invalid argument, not
/// found, backend I/O, cancelled/deadline, and configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend I/O error: {0}")]
    Backend(String),

    #[error("operation cancelled or deadline exceeded")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        CoreError::InvalidArgument(what.into())
    }

    pub fn backend(what: impl Into<String>) -> Self {
        CoreError::Backend(what.into())
    }
}
