//! JSON-on-disk session backend (§4.6). One file per session, written
//! via temp-file-then-rename so a concurrent `load` never observes a
//! partial write.

use crate::{sanitize_session_id, SessionError};
use async_trait::async_trait;
use memory_core::{CoreError, Deadline, Message, Result, SessionBackend, SessionSnapshot};
use std::path::{Path, PathBuf};

fn default_root() -> PathBuf {
    dirs_home().join(".go-deep-agent").join("sessions")
}

/// Minimal stand-in for the `dirs` crate's `home_dir`: the session
/// backend only needs `$HOME` (or `.` as a last resort on a host where
/// it isn't set, e.g. a stripped-down container).
fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub struct FileSessionBackend {
    root: PathBuf,
}

impl FileSessionBackend {
    /// Uses the default root, `~/.go-deep-agent/sessions/`.
    pub fn new() -> Self {
        Self { root: default_root() }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_session_id(session_id)))
    }

    async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.root, perms).await?;
        }
        Ok(())
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
}

impl Default for FileSessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for FileSessionBackend {
    async fn save(&self, session_id: &str, messages: &[Message], _deadline: Deadline) -> Result<()> {
        if session_id.is_empty() {
            return Err(SessionError::InvalidSessionId("empty session id".to_string()).into());
        }

        self.ensure_root().await.map_err(SessionError::from)?;

        let snapshot = SessionSnapshot::new(session_id, messages.to_vec());
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(SessionError::from)?;

        let path = self.path_for(session_id);
        self.write_atomic(&path, &bytes).await.map_err(SessionError::from)?;
        tracing::debug!(session_id, path = %path.display(), "saved session snapshot");
        Ok(())
    }

    async fn load(&self, session_id: &str, _deadline: Deadline) -> Result<Option<Vec<Message>>> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SessionError::from(err).into()),
        };

        let snapshot: SessionSnapshot = serde_json::from_slice(&bytes).map_err(SessionError::from)?;
        snapshot.check_version()?;
        Ok(Some(snapshot.messages))
    }

    async fn delete(&self, session_id: &str, _deadline: Deadline) -> Result<()> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CoreError::from(SessionError::from(err))),
        }
    }

    async fn list(&self, _deadline: Deadline) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SessionError::from(err).into()),
        };

        let mut session_ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(SessionError::from)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    session_ids.push(stem.to_string());
                }
            }
        }
        Ok(session_ids)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_core::{Message, Role};

    fn msg(content: &str) -> Message {
        Message::new(Role::User, content)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());

        let messages = vec![msg("hello"), msg("world")];
        backend.save("s1", &messages, Deadline::none()).await.unwrap();

        let loaded = backend.load("s1", Deadline::none()).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "hello");
        assert_eq!(loaded[1].content, "world");
    }

    #[tokio::test]
    async fn load_missing_session_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());
        let loaded = backend.load("nope", Deadline::none()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn delete_missing_session_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());
        backend.delete("nope", Deadline::none()).await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_all_saved_session_ids() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());
        backend.save("s1", &[msg("a")], Deadline::none()).await.unwrap();
        backend.save("s2", &[msg("b")], Deadline::none()).await.unwrap();

        let mut sessions = backend.list(Deadline::none()).await.unwrap();
        sessions.sort();
        assert_eq!(sessions, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn session_id_is_sanitized_against_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());
        backend
            .save("../../escape", &[msg("a")], Deadline::none())
            .await
            .unwrap();

        // The written file must stay inside the configured root.
        let mut found_outside = false;
        let mut walker = tokio::fs::read_dir(dir.path().parent().unwrap()).await.unwrap();
        while let Some(entry) = walker.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().contains("escape") {
                found_outside = true;
            }
        }
        assert!(!found_outside);
    }

    #[tokio::test]
    async fn save_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSessionBackend::with_root(dir.path());
        backend.save("s1", &[msg("a")], Deadline::none()).await.unwrap();
        backend.delete("s1", Deadline::none()).await.unwrap();
        assert!(backend.load("s1", Deadline::none()).await.unwrap().is_none());
    }
}
