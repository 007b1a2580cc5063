//! Episodic memory (§4.3): the searchable log of important past
//! messages. Exact-content deduplication, four retrieval modes, optional
//! offload to a vector backend, and optional max-size trimming.

use memory_core::{
    Deadline, EmbeddingProvider, FilterOp, Message, MetadataFilter, Result, SearchByTextOptions,
    SearchFilter, ScoredMessage, TimeRange, VectorDocument, VectorStore,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// The defensive dedup window: only the last 100 stored messages are
/// checked against an incoming one (§9: a heuristic, not a correctness
/// guarantee — callers relying on dedup beyond this window are out of
/// contract).
const DEDUP_WINDOW: usize = 100;

const DEFAULT_COLLECTION: &str = "episodic";

/// Running aggregates maintained on every insert so `Stats` doesn't need
/// a full scan (§9's "populate by maintaining running min/max" choice).
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodicAggregates {
    pub oldest_epoch_ms: Option<i64>,
    pub newest_epoch_ms: Option<i64>,
    pub importance_sum: f64,
    pub count: u64,
}

pub struct EpisodicStore {
    max_size: usize,
    collection: String,
    entries: RwLock<Vec<ScoredMessage>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    oldest_epoch_ms: AtomicI64,
    newest_epoch_ms: AtomicI64,
    importance_sum_bits: RwLock<f64>,
    count: AtomicU64,
}

const NO_TIMESTAMP: i64 = i64::MIN;

impl EpisodicStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            collection: DEFAULT_COLLECTION.to_string(),
            entries: RwLock::new(Vec::new()),
            vector_store: None,
            embedding_provider: None,
            oldest_epoch_ms: AtomicI64::new(NO_TIMESTAMP),
            newest_epoch_ms: AtomicI64::new(NO_TIMESTAMP),
            importance_sum_bits: RwLock::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.oldest_epoch_ms.store(NO_TIMESTAMP, Ordering::Relaxed);
        self.newest_epoch_ms.store(NO_TIMESTAMP, Ordering::Relaxed);
        *self.importance_sum_bits.write() = 0.0;
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn aggregates(&self) -> EpisodicAggregates {
        let oldest = self.oldest_epoch_ms.load(Ordering::Relaxed);
        let newest = self.newest_epoch_ms.load(Ordering::Relaxed);
        EpisodicAggregates {
            oldest_epoch_ms: (oldest != NO_TIMESTAMP).then_some(oldest),
            newest_epoch_ms: (newest != NO_TIMESTAMP).then_some(newest),
            importance_sum: *self.importance_sum_bits.read(),
            count: self.count.load(Ordering::Relaxed),
        }
    }

    fn record_insert(&self, entry: &ScoredMessage) {
        let ms = entry.message.timestamp.timestamp_millis();
        self.oldest_epoch_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(if cur == NO_TIMESTAMP { ms } else { cur.min(ms) })
            })
            .ok();
        self.newest_epoch_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(if cur == NO_TIMESTAMP { ms } else { cur.max(ms) })
            })
            .ok();
        *self.importance_sum_bits.write() += entry.importance;
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// §4.3: duplicate iff content equal and `|ts - ts'| < 1s` against
    /// any of the last `DEDUP_WINDOW` stored messages.
    fn is_duplicate(existing: &[ScoredMessage], candidate: &Message) -> bool {
        let window_start = existing.len().saturating_sub(DEDUP_WINDOW);
        existing[window_start..]
            .iter()
            .any(|e| e.message.duplicate_of(candidate))
    }

    fn trim_to_max_size(entries: &mut Vec<ScoredMessage>, max_size: usize) {
        if max_size == 0 {
            return;
        }
        if entries.len() > max_size {
            let excess = entries.len() - max_size;
            entries.drain(0..excess);
        }
    }

    /// Store one scored message. Silently skips an exact-content/
    /// time-window duplicate (§4.3 dedup policy) — not an error.
    /// Vector-backend write failure never fails the call: the
    /// in-memory store is authoritative.
    pub async fn store(&self, message: Message, importance: f64, deadline: Deadline) -> Result<()> {
        let entry = ScoredMessage::new(message, importance);

        {
            let mut entries = self.entries.write();
            if Self::is_duplicate(&entries, &entry.message) {
                return Ok(());
            }
            entries.push(entry.clone());
            self.record_insert(&entry);
            Self::trim_to_max_size(&mut entries, self.max_size);
        }

        if let Some(store) = &self.vector_store {
            let doc = self.encode_for_vector(&entry, None, deadline).await;
            if let Ok(doc) = doc {
                if let Err(err) = store.add(&self.collection, &[doc], deadline).await {
                    tracing::warn!(error = %err, "episodic vector write failed, continuing with in-memory state only");
                }
            }
        }

        Ok(())
    }

    /// Batch variant used by the compressor (§4.5). Each candidate is
    /// deduped independently against the growing in-memory tail, so
    /// duplicates within the same batch are also caught.
    pub async fn store_batch(&self, batch: Vec<ScoredMessage>, deadline: Deadline) -> Result<()> {
        let mut accepted = Vec::with_capacity(batch.len());
        {
            let mut entries = self.entries.write();
            for candidate in batch {
                if Self::is_duplicate(&entries, &candidate.message) {
                    continue;
                }
                entries.push(candidate.clone());
                self.record_insert(&candidate);
                accepted.push(candidate);
            }
            Self::trim_to_max_size(&mut entries, self.max_size);
        }

        if accepted.is_empty() {
            return Ok(());
        }

        if let Some(store) = &self.vector_store {
            let encodings = futures::future::join_all(
                accepted
                    .iter()
                    .enumerate()
                    .map(|(idx, entry)| self.encode_for_vector(entry, Some(idx), deadline)),
            )
            .await;
            let docs: Vec<VectorDocument> = encodings.into_iter().filter_map(Result::ok).collect();
            if !docs.is_empty() {
                if let Err(err) = store.add(&self.collection, &docs, deadline).await {
                    tracing::warn!(error = %err, "episodic batch vector write failed, continuing with in-memory state only");
                }
            }
        }

        Ok(())
    }

    async fn encode_for_vector(
        &self,
        entry: &ScoredMessage,
        batch_index: Option<usize>,
        deadline: Deadline,
    ) -> Result<VectorDocument> {
        let mut metadata = entry.message.metadata.0.clone();
        metadata.insert("role".to_string(), entry.message.role.to_string().into());
        metadata.insert("importance".to_string(), entry.importance.into());
        metadata.insert(
            "timestamp".to_string(),
            entry.message.timestamp.timestamp().into(),
        );

        let id = match batch_index {
            Some(idx) => format!(
                "{}_{}_{}",
                entry.message.timestamp.timestamp_nanos_opt().unwrap_or_default(),
                entry.message.role,
                idx
            ),
            None => format!(
                "{}_{}",
                entry.message.timestamp.timestamp_nanos_opt().unwrap_or_default(),
                entry.message.role
            ),
        };

        let embedding = match &self.embedding_provider {
            Some(provider) => provider.embed(&entry.message.content, deadline).await?,
            None => Vec::new(),
        };

        Ok(VectorDocument {
            id,
            content: entry.message.content.clone(),
            metadata,
            embedding,
        })
    }

    /// Retrieve mode 1 (§4.3): semantic search if a vector backend is
    /// bound, falling back to recency on backend failure or absence.
    pub async fn retrieve(&self, query: &str, top_k: usize, deadline: Deadline) -> Result<Vec<Message>> {
        if let Some(store) = &self.vector_store {
            let opts = SearchByTextOptions {
                collection: self.collection.clone(),
                query: query.to_string(),
                top_k,
                filter: None,
                include_metadata: true,
                include_content: true,
                min_score: 0.0,
            };
            match store.search_by_text(opts, deadline).await {
                Ok(matches) => return Ok(matches.into_iter().map(Self::match_to_message).collect()),
                Err(err) => {
                    tracing::warn!(error = %err, "episodic vector search failed, falling back to recency");
                }
            }
        }
        Ok(self.recency(top_k))
    }

    fn recency(&self, limit: usize) -> Vec<Message> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(limit);
        entries[start..].iter().map(|e| e.message.clone()).collect()
    }

    fn match_to_message(m: memory_core::VectorMatch) -> Message {
        use memory_core::{Metadata, Role};
        use chrono::{DateTime, Utc};

        let role = m
            .metadata
            .get("role")
            .and_then(|v| v.as_str())
            .map(|r| match r {
                "system" => Role::System,
                "assistant" => Role::Assistant,
                "tool" => Role::Tool,
                _ => Role::User,
            })
            .unwrap_or(Role::User);

        let timestamp = m
            .metadata
            .get("timestamp")
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Message {
            role,
            content: m.content,
            timestamp,
            metadata: Metadata(m.metadata),
        }
    }

    /// Retrieve mode 2: linear scan, inclusive both ends, insertion
    /// order, stop after `limit`.
    pub fn retrieve_by_time(&self, range: TimeRange, limit: usize) -> Vec<Message> {
        self.entries
            .read()
            .iter()
            .filter(|e| range.contains(e.message.timestamp))
            .take(limit)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Retrieve mode 3: linear scan, stop after `limit`.
    pub fn retrieve_by_importance(&self, min_importance: f64, limit: usize) -> Vec<Message> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.importance >= min_importance)
            .take(limit)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Retrieve mode 4 (§4.3 Search): vector-backed text search with a
    /// composed metadata filter when a query is present and a backend
    /// is bound; otherwise (or on backend error) an in-memory scan
    /// applying all filters conjunctively.
    pub async fn search(&self, filter: SearchFilter, deadline: Deadline) -> Result<Vec<Message>> {
        let query_non_empty = filter.query.as_deref().is_some_and(|q| !q.is_empty());

        if query_non_empty {
            if let Some(store) = &self.vector_store {
                let mut meta_filter = MetadataFilter::new();
                if filter.min_importance > 0.0 {
                    meta_filter = meta_filter.with("importance", FilterOp::Gte(filter.min_importance.into()));
                }
                if let Some(range) = filter.time_range {
                    meta_filter = meta_filter
                        .with("timestamp", FilterOp::Gte(range.start.timestamp().into()));
                    meta_filter = meta_filter
                        .with("timestamp", FilterOp::Lte(range.end.timestamp().into()));
                }

                let opts = SearchByTextOptions {
                    collection: self.collection.clone(),
                    query: filter.query.clone().unwrap_or_default(),
                    top_k: filter.limit,
                    filter: Some(meta_filter),
                    include_metadata: true,
                    include_content: true,
                    min_score: 0.0,
                };

                match store.search_by_text(opts, deadline).await {
                    Ok(matches) => {
                        let messages: Vec<Message> = matches
                            .into_iter()
                            .filter(|m| Self::tags_match(&m.metadata, &filter.tags))
                            .map(Self::match_to_message)
                            .collect();
                        return Ok(messages);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "episodic search vector backend failed, falling back to in-memory scan");
                    }
                }
            }
        }

        Ok(self.in_memory_search(&filter))
    }

    fn tags_match(metadata: &std::collections::HashMap<String, serde_json::Value>, required: &[String]) -> bool {
        if required.is_empty() {
            return true;
        }
        let tags: Vec<String> = match metadata.get("tags") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => return false,
        };
        required.iter().all(|t| tags.contains(t))
    }

    fn in_memory_search(&self, filter: &SearchFilter) -> Vec<Message> {
        let query_lower = filter.query.as_ref().map(|q| q.to_lowercase());
        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };

        self.entries
            .read()
            .iter()
            .filter(|e| e.importance >= filter.min_importance)
            .filter(|e| match &filter.time_range {
                Some(range) => range.contains(e.message.timestamp),
                None => true,
            })
            .filter(|e| {
                filter
                    .tags
                    .iter()
                    .all(|t| e.message.metadata.tags().contains(t))
            })
            .filter(|e| match &query_lower {
                Some(q) => e.message.content.to_lowercase().contains(q.as_str()),
                None => true,
            })
            .take(limit)
            .map(|e| e.message.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use memory_core::{CoreError, Role, VectorDocument as Doc};

    fn msg(content: &str) -> Message {
        Message::new(Role::User, content)
    }

    /// Either always fails (to exercise the §4.3 fallback-to-recency
    /// path) or echoes back one canned match per call.
    struct MockVectorStore {
        fail: bool,
        canned: Vec<memory_core::VectorMatch>,
    }

    #[async_trait]
    impl VectorStore for MockVectorStore {
        async fn add(&self, _collection: &str, _docs: &[Doc], _deadline: Deadline) -> Result<Vec<String>> {
            if self.fail {
                return Err(CoreError::backend("mock add failure"));
            }
            Ok(Vec::new())
        }

        async fn search_by_text(
            &self,
            _opts: SearchByTextOptions,
            _deadline: Deadline,
        ) -> Result<Vec<memory_core::VectorMatch>> {
            if self.fail {
                return Err(CoreError::backend("mock search failure"));
            }
            Ok(self.canned.clone())
        }

        async fn delete(&self, _collection: &str, _ids: &[String], _deadline: Deadline) -> Result<()> {
            Ok(())
        }

        async fn count(&self, _collection: &str, _deadline: Deadline) -> Result<usize> {
            Ok(0)
        }

        async fn clear(&self, _collection: &str, _deadline: Deadline) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retrieve_falls_back_to_recency_on_vector_failure() {
        let backend = Arc::new(MockVectorStore { fail: true, canned: Vec::new() });
        let store = EpisodicStore::new(0).with_vector_store(backend);

        for i in 0..3 {
            store
                .store(msg(&format!("m{i}")), 0.9, Deadline::none())
                .await
                .unwrap();
        }

        let results = store.retrieve("anything", 2, Deadline::none()).await.unwrap();
        assert_eq!(
            results.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2"]
        );
    }

    #[tokio::test]
    async fn retrieve_uses_vector_backend_when_present() {
        let canned = vec![memory_core::VectorMatch {
            id: "1".to_string(),
            content: "vector hit".to_string(),
            metadata: std::collections::HashMap::new(),
            score: 0.9,
            rank: 0,
        }];
        let backend = Arc::new(MockVectorStore { fail: false, canned });
        let store = EpisodicStore::new(0).with_vector_store(backend);
        store.store(msg("irrelevant"), 0.9, Deadline::none()).await.unwrap();

        let results = store.retrieve("query", 5, Deadline::none()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "vector hit");
    }

    #[tokio::test]
    async fn store_succeeds_even_when_vector_write_fails() {
        let backend = Arc::new(MockVectorStore { fail: true, canned: Vec::new() });
        let store = EpisodicStore::new(0).with_vector_store(backend);

        store.store(msg("hello"), 0.9, Deadline::none()).await.unwrap();
        assert_eq!(store.size(), 1);
    }

    #[tokio::test]
    async fn dedup_within_one_second_skips() {
        let store = EpisodicStore::new(0);
        let base = Utc::now();
        let m1 = msg("hello").with_timestamp(base);
        let m2 = msg("hello").with_timestamp(base + Duration::milliseconds(500));
        store.store(m1, 0.8, Deadline::none()).await.unwrap();
        store.store(m2, 0.8, Deadline::none()).await.unwrap();
        assert_eq!(store.size(), 1);
    }

    #[tokio::test]
    async fn dedup_outside_window_stores_both() {
        let store = EpisodicStore::new(0);
        let base = Utc::now();
        let m1 = msg("hello").with_timestamp(base);
        let m2 = msg("hello").with_timestamp(base + Duration::seconds(2));
        store.store(m1, 0.8, Deadline::none()).await.unwrap();
        store.store(m2, 0.8, Deadline::none()).await.unwrap();
        assert_eq!(store.size(), 2);
    }

    #[tokio::test]
    async fn max_size_trims_from_head() {
        let store = EpisodicStore::new(2);
        for i in 0..4 {
            store
                .store(msg(&format!("m{i}")), 0.9, Deadline::none())
                .await
                .unwrap();
        }
        assert_eq!(store.size(), 2);
        let recent = store.retrieve_by_importance(0.0, 10);
        assert_eq!(
            recent.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m2", "m3"]
        );
    }

    #[tokio::test]
    async fn retrieve_by_time_inclusive_bounds() {
        let store = EpisodicStore::new(0);
        let base = Utc::now();
        for i in 0..3 {
            store
                .store(
                    msg(&format!("m{i}")).with_timestamp(base + Duration::seconds(i * 10)),
                    0.9,
                    Deadline::none(),
                )
                .await
                .unwrap();
        }
        let range = TimeRange::new(base, base + Duration::seconds(10));
        let results = store.retrieve_by_time(range, 10);
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_tag_intersection() {
        let store = EpisodicStore::new(0);
        let mut m1 = msg("old one");
        m1.metadata.set_tags(["old"]);
        let mut m2 = msg("recent one");
        m2.metadata.set_tags(["recent"]);
        let mut m3 = msg("recent important one");
        m3.metadata.set_tags(["recent", "important"]);

        store.store(m1, 0.9, Deadline::none()).await.unwrap();
        store.store(m2, 0.9, Deadline::none()).await.unwrap();
        store.store(m3, 0.9, Deadline::none()).await.unwrap();

        let filter = SearchFilter::new()
            .with_tags(["recent", "important"])
            .with_limit(10);
        let results = store.search(filter, Deadline::none()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "recent important one");
    }

    #[tokio::test]
    async fn aggregates_track_min_max_and_average() {
        let store = EpisodicStore::new(0);
        let base = Utc::now();
        store
            .store(msg("a").with_timestamp(base), 0.4, Deadline::none())
            .await
            .unwrap();
        store
            .store(
                msg("b").with_timestamp(base + Duration::seconds(60)),
                0.8,
                Deadline::none(),
            )
            .await
            .unwrap();

        let agg = store.aggregates();
        assert_eq!(agg.count, 2);
        assert!((agg.importance_sum - 1.2).abs() < 1e-9);
        assert!(agg.oldest_epoch_ms.unwrap() < agg.newest_epoch_ms.unwrap());
    }
}
