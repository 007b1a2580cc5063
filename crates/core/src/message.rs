//! Message and metadata types.
//!
//! Metadata is the open extensibility seam (§9): primitives, strings, and
//! lists only, never a back-reference to the message or a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Speaker role for a message, matching the four roles a chat transcript
/// distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// Open key→value metadata map. Known keys (`importance`, `tags`,
/// `tool_call_id`, `type`, `category`, `confidence`) have typed accessors;
/// anything else passes through untouched. A bare newtype struct
/// serializes transparently as its inner map (no wrapping array) —
/// `#[serde(flatten)]` is not valid on a tuple struct's sole field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(pub HashMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn importance(&self) -> Option<f64> {
        self.0.get("importance").and_then(Value::as_f64)
    }

    pub fn set_importance(&mut self, score: f64) {
        self.insert("importance", score);
    }

    pub fn tags(&self) -> Vec<String> {
        match self.0.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_tags(&mut self, tags: impl IntoIterator<Item = impl Into<String>>) {
        let values: Vec<Value> = tags.into_iter().map(|t| Value::String(t.into())).collect();
        self.0.insert("tags".to_string(), Value::Array(values));
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.0.get("tool_call_id").and_then(Value::as_str)
    }

    pub fn bool_flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for Metadata {
    fn from(map: HashMap<String, Value>) -> Self {
        Metadata(map)
    }
}

/// A single chat message. Value object: equality for deduplication is
/// `(content, timestamp within 1s)`, checked via [`Message::duplicate_of`]
/// rather than `PartialEq`, which stays structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Dedup predicate from §3: exact content match and timestamps within
    /// one second of each other.
    pub fn duplicate_of(&self, other: &Message) -> bool {
        if self.content != other.content {
            return false;
        }
        let delta = (self.timestamp - other.timestamp).num_milliseconds().abs();
        delta < 1000
    }
}

/// A message paired with its importance score. Raw (pre-normalization)
/// sums may exceed 1.0 internally; the episodic store preserves what it
/// is given rather than re-normalizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub message: Message,
    pub importance: f64,
}

impl ScoredMessage {
    pub fn new(message: Message, importance: f64) -> Self {
        Self { message, importance }
    }
}
