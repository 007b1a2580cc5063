//! Concrete `SessionBackend` implementations (§4.6): a JSON-on-disk
//! file backend and a Redis/Valkey-compatible backend. Neither crate
//! besides this one and its caller knows which backend is in use — both
//! speak only `memory_core::traits::SessionBackend`.

pub mod file;
pub mod redis_backend;

pub use file::FileSessionBackend;
pub use redis_backend::RedisSessionBackend;

use memory_core::CoreError;
use thiserror::Error;

/// Failure classes specific to the concrete backends, converted into
/// `CoreError` at the trait boundary so callers only ever see the
/// shared taxonomy (§7). Mirrors the teacher's `AgentError` pattern:
/// one variant per failure class, `#[error("...")]`, `From` impls.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Io(e) => CoreError::backend(e.to_string()),
            SessionError::Serialization(e) => CoreError::Serialization(e),
            SessionError::Redis(e) => CoreError::backend(e.to_string()),
            SessionError::InvalidSessionId(s) => CoreError::invalid(s),
            SessionError::UnsupportedVersion(v) => {
                CoreError::invalid(format!("unsupported snapshot version: {v}"))
            }
        }
    }
}

/// Replaces path separators and `..` traversal sequences with `_`
/// (§4.6's File backend sanitization). Applied to the session id before
/// it becomes part of a filesystem path.
pub(crate) fn sanitize_session_id(session_id: &str) -> String {
    session_id
        .replace("..", "_")
        .replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal_and_separators() {
        assert_eq!(sanitize_session_id("../../etc/passwd"), "____etc_passwd");
        assert_eq!(sanitize_session_id("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_session_id("plain-id"), "plain-id");
    }
}
