//! Query-shaped types used by recall and search across tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive wall-clock bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Options shaping a `MemorySystem::recall` call (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallOptions {
    pub max_messages: usize,
    pub working_size: usize,
    pub episodic_top_k: usize,
    pub semantic_top_k: usize,
    pub min_importance: f64,
    pub time_range: Option<TimeRange>,
    pub include_summaries: bool,
    pub deduplicate: bool,
    /// Free-text query forwarded to episodic search and semantic query.
    pub query: String,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            max_messages: 20,
            working_size: 10,
            episodic_top_k: 5,
            semantic_top_k: 3,
            min_importance: 0.0,
            time_range: None,
            include_summaries: true,
            deduplicate: true,
            query: String::new(),
        }
    }
}

/// Filter shape accepted by `EpisodicStore::search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub min_importance: f64,
    pub time_range: Option<TimeRange>,
    /// Tags that must all be present (intersection, not subset-of).
    pub tags: Vec<String>,
    pub limit: usize,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}
