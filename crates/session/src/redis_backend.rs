//! Redis/Valkey-compatible session backend (§4.6). One key per
//! session; save is a single `SET` so a concurrent `load` never
//! observes a half-written value.

use crate::SessionError;
use async_trait::async_trait;
use memory_core::{Deadline, Message, Result, SessionBackend, SessionSnapshot};
use redis::AsyncCommands;

const DEFAULT_PREFIX: &str = "agent:session:";

pub struct RedisSessionBackend {
    client: redis::Client,
    prefix: String,
    /// Seconds. 0 = no expiry.
    ttl_seconds: u64,
}

impl RedisSessionBackend {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(SessionError::from)?;
        Ok(Self {
            client,
            prefix: DEFAULT_PREFIX.to_string(),
            ttl_seconds: 0,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn key_for(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionError::from(e).into())
    }
}

#[async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn save(&self, session_id: &str, messages: &[Message], _deadline: Deadline) -> Result<()> {
        if session_id.is_empty() {
            return Err(SessionError::InvalidSessionId("empty session id".to_string()).into());
        }

        let snapshot = SessionSnapshot::new(session_id, messages.to_vec());
        let payload = serde_json::to_string(&snapshot).map_err(SessionError::from)?;
        let key = self.key_for(session_id);
        let mut conn = self.connection().await?;

        if self.ttl_seconds > 0 {
            conn.set_ex::<_, _, ()>(&key, payload, self.ttl_seconds)
                .await
                .map_err(SessionError::from)?;
        } else {
            conn.set::<_, _, ()>(&key, payload).await.map_err(SessionError::from)?;
        }

        tracing::debug!(session_id, key, "saved session snapshot to redis");
        Ok(())
    }

    async fn load(&self, session_id: &str, _deadline: Deadline) -> Result<Option<Vec<Message>>> {
        let key = self.key_for(session_id);
        let mut conn = self.connection().await?;

        let payload: Option<String> = conn.get(&key).await.map_err(SessionError::from)?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&payload).map_err(SessionError::from)?;
        snapshot.check_version()?;
        Ok(Some(snapshot.messages))
    }

    async fn delete(&self, session_id: &str, _deadline: Deadline) -> Result<()> {
        let key = self.key_for(session_id);
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(&key).await.map_err(SessionError::from)?;
        Ok(())
    }

    async fn list(&self, _deadline: Deadline) -> Result<Vec<String>> {
        let pattern = format!("{}*", self.prefix);
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(SessionError::from)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_prefix_and_session_id() {
        let backend = RedisSessionBackend::new("redis://127.0.0.1/").unwrap();
        assert_eq!(backend.key_for("s1"), "agent:session:s1");
    }

    #[test]
    fn custom_prefix_is_honored() {
        let backend = RedisSessionBackend::new("redis://127.0.0.1/")
            .unwrap()
            .with_prefix("myapp:sess:");
        assert_eq!(backend.key_for("s1"), "myapp:sess:s1");
    }

    // A live-Redis round-trip test is intentionally not included here:
    // this crate has no Redis test-container dependency, and the
    // save/load/delete/list wiring above is otherwise exercised by the
    // in-memory backend used in memory-engine's orchestrator tests.
}
