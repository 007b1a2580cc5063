//! The `Fact` entity owned by the semantic store.

use crate::message::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A long-lived piece of structured knowledge. `id` is assigned on
/// insert if the caller leaves it empty, and is stable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Fact {
    /// Construct a fact ready to pass to `StoreFact`; id is left empty so
    /// the store assigns one, and both timestamps are stamped to now.
    pub fn new(content: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content: content.into(),
            category: category.into(),
            source: String::new(),
            confidence: 1.0,
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}
