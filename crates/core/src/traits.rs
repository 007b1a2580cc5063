//! Capability interfaces the core calls but never implements (§6). Vector
//! store, embedding provider, and session backend are injected by the
//! caller; the orchestrator never owns the lifecycle of a backend it did
//! not construct itself (§9).

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// A deadline threaded through every I/O-bearing trait method, satisfying
/// §5's "accept a cancellation token / deadline" without a bespoke
/// cancellation framework. `tokio::time::timeout` wraps the call at the
/// orchestrator boundary; backends may also check it directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(pub Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(t) if Instant::now() >= t)
    }

    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.0.map(|t| t.saturating_duration_since(Instant::now()))
    }
}

/// A document to be upserted into a vector store collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub embedding: Vec<f32>,
}

/// A single match returned from a text or vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub score: f32,
    pub rank: usize,
}

/// A single comparison against a metadata field. Mirrors the Mongo-style
/// operators the episodic store composes in its search path (`$gte`
/// against epoch-second timestamps, `$gte` against importance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterOp {
    Eq(serde_json::Value),
    Gte(serde_json::Value),
    Lte(serde_json::Value),
}

/// A conjunction of field comparisons passed alongside a text query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter(pub HashMap<String, FilterOp>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.0.insert(field.into(), op);
        self
    }
}

/// Parameters for a text-search query against a vector store collection.
#[derive(Debug, Clone)]
pub struct SearchByTextOptions {
    pub collection: String,
    pub query: String,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
    pub include_metadata: bool,
    pub include_content: bool,
    pub min_score: f32,
}

/// A vector database / index, treated purely as a capability interface
/// (§1's out-of-scope: the core never implements one, only calls it).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(
        &self,
        collection: &str,
        docs: &[VectorDocument],
        deadline: Deadline,
    ) -> Result<Vec<String>>;

    async fn search_by_text(
        &self,
        opts: SearchByTextOptions,
        deadline: Deadline,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete(&self, collection: &str, ids: &[String], deadline: Deadline) -> Result<()>;

    async fn count(&self, collection: &str, deadline: Deadline) -> Result<usize>;

    async fn clear(&self, collection: &str, deadline: Deadline) -> Result<()>;
}

/// An embedding provider, used only through the `VectorStore` boundary by
/// the episodic store's offload path.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, deadline: Deadline) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}

/// Durable session transcript storage (§4.6, §6). `load` returning
/// `Ok(None)` for an absent session is not an error; the distinction
/// between "absent" and "backend failure" is load-bearing for the
/// auto-load-is-not-an-error rule in §7.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn save(
        &self,
        session_id: &str,
        messages: &[Message],
        deadline: Deadline,
    ) -> Result<()>;

    async fn load(&self, session_id: &str, deadline: Deadline) -> Result<Option<Vec<Message>>>;

    async fn delete(&self, session_id: &str, deadline: Deadline) -> Result<()>;

    async fn list(&self, deadline: Deadline) -> Result<Vec<String>>;

    async fn close(&self) -> Result<()>;
}
