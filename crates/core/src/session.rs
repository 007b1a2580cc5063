//! The durable transcript snapshot format (§6).

use crate::error::{CoreError, Result};
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot wire format version this build writes and accepts. Loading a
/// snapshot with a higher version is a [`CoreError::InvalidArgument`],
/// never silently accepted.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A session's complete transcript at a point in time, in insertion
/// order. The whole value is replaced atomically on each save; no
/// partial write is ever observable by a concurrent load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        Self {
            version: SNAPSHOT_VERSION,
            session_id: session_id.into(),
            messages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the snapshot version before trusting its contents.
    pub fn check_version(&self) -> Result<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(CoreError::InvalidArgument(format!(
                "session snapshot version {} is newer than supported version {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}
