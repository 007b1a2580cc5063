//! `MemorySystem` (§4.5): the orchestrator. Owns the three tiers, the
//! config, and compression/session bookkeeping, and exposes the Add /
//! Recall / Compress / Stats / SetConfig / session-manager surface that
//! everything else in this crate exists to support.

use crate::compressor::{self, CompressionOutcome};
use crate::episodic::EpisodicStore;
use crate::scorer::ImportanceScorer;
use crate::semantic::SemanticStore;
use crate::working::WorkingStore;
use chrono::{DateTime, Utc};
use memory_core::{
    CoreError, Deadline, EmbeddingProvider, MemoryConfig, Message, Metadata, RecallOptions,
    Result, Role, SearchFilter, SessionBackend, VectorStore,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Importance used for a compressed message that never carried a
/// `metadata["importance"]` value — the midpoint, per §9's ambiguity on
/// `default_importance`.
const DEFAULT_COMPRESSED_IMPORTANCE: f64 = 0.5;

/// Bookkeeping the orchestrator owns directly: config, counters, and
/// session binding. Guarded by its own lock, distinct from any store's
/// lock (§5) — the compress trigger in `add` releases this lock before
/// calling into `Working`/`Episodic`.
struct OrchestratorState {
    config: MemoryConfig,
    total_messages: u64,
    compression_count: u64,
    last_compression: Option<DateTime<Utc>>,
    session_id: Option<String>,
    auto_save: bool,
}

/// Aggregated counters returned by `MemorySystem::stats` (§4.5 Stats).
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub working_size: usize,
    pub working_capacity: usize,
    pub episodic_size: usize,
    pub episodic_oldest: Option<DateTime<Utc>>,
    pub episodic_newest: Option<DateTime<Utc>>,
    pub episodic_average_importance: f64,
    pub semantic_size: usize,
    pub semantic_categories: Vec<String>,
    pub total_messages: u64,
    pub compression_count: u64,
    pub last_compression: Option<DateTime<Utc>>,
}

pub struct MemorySystem {
    working: WorkingStore,
    episodic: EpisodicStore,
    semantic: SemanticStore,
    scorer: ImportanceScorer,
    state: RwLock<OrchestratorState>,
    session_backend: RwLock<Option<Arc<dyn SessionBackend>>>,
}

impl MemorySystem {
    pub fn builder() -> MemorySystemBuilder {
        MemorySystemBuilder::default()
    }

    /// A system with every tier enabled and defaults per §3's
    /// `MemoryConfig`.
    pub fn new() -> Self {
        Self::builder().build()
    }

    // ---- Add pipeline (§4.5) ----------------------------------------

    /// Append `message`, score it, conditionally archive it to episodic
    /// storage, and conditionally trigger compression. Episodic and
    /// compression failures are swallowed (logged); only a failure to
    /// append to Working would be fatal, and `WorkingStore::add` never
    /// fails by construction.
    pub async fn add(&self, mut message: Message, deadline: Deadline) -> Result<()> {
        let (scoring_enabled, weights, episodic_enabled, threshold, auto_compress, compression_threshold) = {
            let state = self.state.read();
            (
                state.config.importance_scoring,
                state.config.importance_weights,
                state.config.episodic_enabled,
                state.config.episodic_threshold,
                state.config.auto_compress,
                state.config.compression_threshold,
            )
        };

        // The reference scorer overwrites a caller-supplied
        // metadata["importance"] when scoring is enabled (§9's first
        // documented ambiguity — this implementation picks "overwrite",
        // matching the reference behavior literally).
        // `score` is the bounded [0, 1] value §4.1 contracts for
        // metadata["importance"]; `raw_score` is the pre-normalization
        // weighted sum §3 has the episodic store gate on and retain.
        let (score, raw_score) = if scoring_enabled {
            let raw_score = self.scorer.raw_score(&message, &weights);
            let score = self.scorer.score(&message, &weights);
            message.metadata.set_importance(score);
            (score, raw_score)
        } else {
            let score = message.metadata.importance().unwrap_or(0.0);
            (score, score)
        };

        // When auto-compress is armed, use the overflow-preserving path
        // so the compress trigger below still finds genuine overflow to
        // act on; otherwise Working enforces its own capacity (§4.2).
        if auto_compress {
            self.working.add_overflowing(message.clone());
        } else {
            self.working.add(message.clone());
        }

        {
            let mut state = self.state.write();
            state.total_messages += 1;
        }

        if episodic_enabled && raw_score >= threshold {
            if let Err(err) = self.episodic.store(message.clone(), raw_score, deadline).await {
                tracing::warn!(error = %err, "episodic store failed during add, continuing");
            }
        }

        // Released the orchestrator's write lock above before this
        // check: Compress acquires Working's own lock, and holding both
        // at once would invert the documented lock order (§5).
        if auto_compress && self.working.size() >= compression_threshold {
            if let Err(err) = self.compress(deadline).await {
                tracing::warn!(error = %err, "auto-compress failed during add");
            }
        }

        self.maybe_auto_save(deadline).await;

        Ok(())
    }

    // ---- Compress pipeline (§4.5) ------------------------------------

    /// Runs one compression pass: drains Working overflow into
    /// Episodic (when enabled) and reinserts a summary placeholder.
    /// No-op when `summarization_mode == none` or nothing is overflowing.
    pub async fn compress(&self, deadline: Deadline) -> Result<CompressionOutcome> {
        let (mode, episodic_enabled) = {
            let state = self.state.read();
            (state.config.summarization_mode, state.config.episodic_enabled)
        };

        let outcome = compressor::compress(
            &self.working,
            &self.episodic,
            mode,
            DEFAULT_COMPRESSED_IMPORTANCE,
            episodic_enabled,
            deadline,
        )
        .await?;

        if outcome.ran {
            let mut state = self.state.write();
            state.compression_count += 1;
            state.last_compression = Some(Utc::now());
        }

        Ok(outcome)
    }

    // ---- Recall pipeline (§4.5) ---------------------------------------

    /// Composes a bounded, optionally deduplicated context window from
    /// all three tiers. Episodic and semantic failures are swallowed,
    /// returning whatever was gathered so far (§7: memory is advisory).
    pub async fn recall(&self, opts: RecallOptions, deadline: Deadline) -> Result<Vec<Message>> {
        let (episodic_enabled, semantic_enabled) = {
            let state = self.state.read();
            (state.config.episodic_enabled, state.config.semantic_enabled)
        };

        let mut result = Vec::new();

        if opts.working_size > 0 {
            result.extend(self.working.recent(opts.working_size));
        }

        if episodic_enabled && opts.episodic_top_k > 0 {
            let filter = SearchFilter {
                query: (!opts.query.is_empty()).then(|| opts.query.clone()),
                min_importance: opts.min_importance,
                time_range: opts.time_range,
                tags: Vec::new(),
                limit: opts.episodic_top_k,
            };
            match self.episodic.search(filter, deadline).await {
                Ok(messages) => result.extend(messages),
                Err(err) => tracing::warn!(error = %err, "episodic recall failed, returning partial results"),
            }
        }

        if semantic_enabled && opts.semantic_top_k > 0 {
            let facts = self.semantic.query_knowledge(&opts.query, opts.semantic_top_k);
            result.extend(facts.into_iter().map(Self::fact_to_message));
        }

        if opts.deduplicate {
            let mut seen = HashSet::new();
            result.retain(|m| seen.insert(m.content.clone()));
        }

        if opts.max_messages > 0 && result.len() > opts.max_messages {
            result.truncate(opts.max_messages);
        }

        Ok(result)
    }

    fn fact_to_message(fact: memory_core::Fact) -> Message {
        let mut metadata = Metadata::new();
        metadata.insert("type", "fact");
        metadata.insert("category", fact.category);
        metadata.insert("confidence", fact.confidence);
        Message {
            role: Role::System,
            content: fact.content,
            timestamp: fact.created_at,
            metadata,
        }
    }

    // ---- Stats / config -----------------------------------------------

    pub fn stats(&self) -> MemoryStats {
        let agg = self.episodic.aggregates();
        let average_importance = if agg.count > 0 {
            agg.importance_sum / agg.count as f64
        } else {
            0.0
        };
        let state = self.state.read();

        MemoryStats {
            working_size: self.working.size(),
            working_capacity: self.working.capacity(),
            episodic_size: self.episodic.size(),
            episodic_oldest: agg
                .oldest_epoch_ms
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms)),
            episodic_newest: agg
                .newest_epoch_ms
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms)),
            episodic_average_importance: average_importance,
            semantic_size: self.semantic.size(),
            semantic_categories: self.semantic.categories(),
            total_messages: state.total_messages,
            compression_count: state.compression_count,
            last_compression: state.last_compression,
        }
    }

    pub fn get_config(&self) -> MemoryConfig {
        self.state.read().config.clone()
    }

    /// Takes effect for subsequent calls. A change to `working_capacity`
    /// does not retroactively resize the already-constructed Working
    /// store (§4.5 — documented, not silently applied).
    pub fn set_config(&self, config: MemoryConfig) {
        self.state.write().config = config;
    }

    // ---- Direct tier access (escape hatch for callers that need it) --

    pub fn working(&self) -> &WorkingStore {
        &self.working
    }

    pub fn episodic(&self) -> &EpisodicStore {
        &self.episodic
    }

    pub fn semantic(&self) -> &SemanticStore {
        &self.semantic
    }

    // ---- Session manager (§4.6) ----------------------------------------

    /// Binds `session_id` to `backend` and immediately replays any
    /// existing snapshot into Working, in order. An absent snapshot is
    /// not an error (§7) — the session simply starts empty.
    pub async fn bind_session(
        &self,
        session_id: impl Into<String>,
        backend: Arc<dyn SessionBackend>,
        deadline: Deadline,
    ) -> Result<()> {
        let session_id = session_id.into();

        if let Some(messages) = backend.load(&session_id, deadline).await? {
            self.working.clear();
            for message in messages {
                self.working.add(message);
            }
        }

        *self.session_backend.write() = Some(backend);
        self.state.write().session_id = Some(session_id);
        Ok(())
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.state.write().auto_save = enabled;
    }

    /// Explicit save: surfaces every error, including a missing
    /// session_id/backend (§7's Configuration error kind).
    pub async fn save_session(&self, deadline: Deadline) -> Result<()> {
        let (session_id, backend) = self.session_binding()?;
        let messages = self.working.all();
        backend.save(&session_id, &messages, deadline).await
    }

    /// Explicit load: unlike the auto-load performed by `bind_session`,
    /// an absent snapshot IS surfaced as `NotFound` (§7).
    pub async fn load_session(&self, deadline: Deadline) -> Result<()> {
        let (session_id, backend) = self.session_binding()?;
        match backend.load(&session_id, deadline).await? {
            Some(messages) => {
                self.working.clear();
                for message in messages {
                    self.working.add(message);
                }
                Ok(())
            }
            None => Err(CoreError::not_found(session_id)),
        }
    }

    pub async fn delete_session(&self, deadline: Deadline) -> Result<()> {
        let (session_id, backend) = self.session_binding()?;
        backend.delete(&session_id, deadline).await
    }

    pub async fn list_sessions(&self, deadline: Deadline) -> Result<Vec<String>> {
        let backend = self
            .session_backend
            .read()
            .clone()
            .ok_or_else(|| CoreError::Configuration("session backend not set".to_string()))?;
        backend.list(deadline).await
    }

    fn session_binding(&self) -> Result<(String, Arc<dyn SessionBackend>)> {
        let session_id = self
            .state
            .read()
            .session_id
            .clone()
            .ok_or_else(|| CoreError::Configuration("session_id not set".to_string()))?;
        let backend = self
            .session_backend
            .read()
            .clone()
            .ok_or_else(|| CoreError::Configuration("session backend not set".to_string()))?;
        Ok((session_id, backend))
    }

    /// After each turn, if bound and auto-save is enabled, persist the
    /// full current transcript. Failure is logged, never surfaced
    /// (§4.6, §7) — the turn itself already succeeded.
    async fn maybe_auto_save(&self, deadline: Deadline) {
        let auto_save = self.state.read().auto_save;
        if !auto_save {
            return;
        }
        let Ok((session_id, backend)) = self.session_binding() else {
            return;
        };
        let messages = self.working.all();
        if let Err(err) = backend.save(&session_id, &messages, deadline).await {
            tracing::warn!(error = %err, "auto-save failed after turn, continuing");
        }
    }
}

impl Default for MemorySystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `MemorySystem` (§6: "builder methods for enabling memory,
/// configuring capacity, setting episodic threshold, supplying
/// importance weights, enabling semantic store, binding session id and
/// backend, toggling auto-save"), in the teacher's `with_*` idiom.
#[derive(Default)]
pub struct MemorySystemBuilder {
    config: MemoryConfig,
    vector_store: Option<Arc<dyn VectorStore>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    episodic_collection: Option<String>,
    session_backend: Option<Arc<dyn SessionBackend>>,
    session_id: Option<String>,
    auto_save: bool,
    compression_threshold_set: bool,
}

impl MemorySystemBuilder {
    pub fn working_capacity(mut self, capacity: usize) -> Self {
        self.config.working_capacity = capacity;
        self
    }

    pub fn summarization_mode(mut self, mode: memory_core::SummarizationMode) -> Self {
        self.config.summarization_mode = mode;
        self
    }

    pub fn episodic_enabled(mut self, enabled: bool) -> Self {
        self.config.episodic_enabled = enabled;
        self
    }

    pub fn episodic_threshold(mut self, threshold: f64) -> Self {
        self.config.episodic_threshold = threshold;
        self
    }

    pub fn episodic_max_size(mut self, max_size: usize) -> Self {
        self.config.episodic_max_size = max_size;
        self
    }

    pub fn episodic_collection(mut self, collection: impl Into<String>) -> Self {
        self.episodic_collection = Some(collection.into());
        self
    }

    pub fn semantic_enabled(mut self, enabled: bool) -> Self {
        self.config.semantic_enabled = enabled;
        self
    }

    pub fn semantic_auto_learn(mut self, enabled: bool) -> Self {
        self.config.semantic_auto_learn = enabled;
        self
    }

    pub fn auto_compress(mut self, enabled: bool) -> Self {
        self.config.auto_compress = enabled;
        self
    }

    pub fn compression_threshold(mut self, threshold: usize) -> Self {
        self.config.compression_threshold = threshold;
        self.compression_threshold_set = true;
        self
    }

    pub fn compression_interval(mut self, interval: usize) -> Self {
        self.config.compression_interval = interval;
        self
    }

    pub fn importance_scoring(mut self, enabled: bool) -> Self {
        self.config.importance_scoring = enabled;
        self
    }

    pub fn importance_weights(mut self, weights: memory_core::ImportanceWeights) -> Self {
        self.config.importance_weights = weights;
        self
    }

    pub fn deduplication_enabled(mut self, enabled: bool) -> Self {
        self.config.deduplication_enabled = enabled;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Sets the session id and backend at construction time. This skips
    /// the auto-load replay `bind_session` performs (building is
    /// synchronous; loading is not) — call `MemorySystem::bind_session`
    /// after construction if an existing snapshot should be replayed.
    pub fn session(mut self, session_id: impl Into<String>, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_id = Some(session_id.into());
        self.session_backend = Some(backend);
        self
    }

    pub fn auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    pub fn build(mut self) -> MemorySystem {
        // `compression_threshold` defaults to `working_capacity` unless
        // the caller set it explicitly — without this, a custom capacity
        // passed to `working_capacity` alone would leave Working growing
        // to `MemoryConfig::default`'s threshold before the first
        // compress, violating the "observable Working size <= capacity"
        // invariant (§1) whenever auto-compress is armed.
        if !self.compression_threshold_set {
            self.config.compression_threshold = self.config.working_capacity;
        }

        let mut episodic = EpisodicStore::new(self.config.episodic_max_size);
        if let Some(collection) = self.episodic_collection {
            episodic = episodic.with_collection(collection);
        }
        if let Some(store) = self.vector_store {
            episodic = episodic.with_vector_store(store);
        }
        if let Some(provider) = self.embedding_provider {
            episodic = episodic.with_embedding_provider(provider);
        }

        MemorySystem {
            working: WorkingStore::new(self.config.working_capacity),
            episodic,
            semantic: SemanticStore::new(),
            scorer: ImportanceScorer::new(),
            state: RwLock::new(OrchestratorState {
                config: self.config,
                total_messages: 0,
                compression_count: 0,
                last_compression: None,
                session_id: self.session_id,
                auto_save: self.auto_save,
            }),
            session_backend: RwLock::new(self.session_backend),
        }
    }
}
