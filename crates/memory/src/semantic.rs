//! Semantic memory (§4.4): durable key-value facts, independent of the
//! conversational timeline. A single guarded map — no eviction, no
//! dedup, callers own the category taxonomy.

use chrono::Utc;
use memory_core::{CoreError, Fact, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SemanticStore {
    facts: RwLock<HashMap<String, Fact>>,
    next_id: AtomicU64,
}

impl Default for SemanticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticStore {
    pub fn new() -> Self {
        Self {
            facts: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("fact-{n}")
    }

    /// StoreFact (§4.4): assigns an id when `fact.id` is empty, stamps
    /// `created_at`/`updated_at` to now, and returns the assigned id.
    /// A caller-supplied id overwrites any existing fact at that id.
    pub fn store_fact(&self, mut fact: Fact) -> Result<String> {
        let now = Utc::now();
        if fact.id.is_empty() {
            fact.id = self.generate_id();
            fact.created_at = now;
        }
        fact.updated_at = now;
        let id = fact.id.clone();
        self.facts.write().insert(id.clone(), fact);
        Ok(id)
    }

    /// QueryKnowledge (§4.4): a naive listing, most-recently-updated
    /// first, up to `limit` (0 means unlimited). There is no semantic
    /// ranking here — that lives behind the episodic store's vector
    /// backend; this is a plain key-value scan.
    pub fn query_knowledge(&self, query: &str, limit: usize) -> Vec<Fact> {
        let facts = self.facts.read();
        let query_lower = query.to_lowercase();
        let mut matches: Vec<Fact> = facts
            .values()
            .filter(|f| query.is_empty() || f.content.to_lowercase().contains(&query_lower))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 {
            matches.truncate(limit);
        }
        matches
    }

    pub fn get_fact(&self, id: &str) -> Option<Fact> {
        self.facts.read().get(id).cloned()
    }

    /// UpdateFact (§4.4): `NotFound` if `id` doesn't exist. Preserves
    /// `id` and `created_at`; refreshes `updated_at`.
    pub fn update_fact(&self, id: &str, mut fact: Fact) -> Result<()> {
        let mut facts = self.facts.write();
        let existing = facts.get(id).ok_or_else(|| CoreError::not_found(id))?;
        fact.id = existing.id.clone();
        fact.created_at = existing.created_at;
        fact.updated_at = Utc::now();
        facts.insert(id.to_string(), fact);
        Ok(())
    }

    /// DeleteFact (§4.4): `NotFound` if `id` doesn't exist.
    pub fn delete_fact(&self, id: &str) -> Result<()> {
        let mut facts = self.facts.write();
        if facts.remove(id).is_none() {
            return Err(CoreError::not_found(id));
        }
        Ok(())
    }

    /// ListFacts (§4.4): exact category match, `limit == 0` unlimited.
    pub fn list_facts(&self, category: &str, limit: usize) -> Vec<Fact> {
        let facts = self.facts.read();
        let mut matches: Vec<Fact> = facts
            .values()
            .filter(|f| f.category == category)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 {
            matches.truncate(limit);
        }
        matches
    }

    pub fn clear(&self) {
        self.facts.write().clear();
    }

    pub fn size(&self) -> usize {
        self.facts.read().len()
    }

    /// Distinct non-empty categories present, sorted. Backs `Stats`'
    /// `semantic_categories` field.
    pub fn categories(&self) -> Vec<String> {
        let facts = self.facts.read();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for fact in facts.values() {
            if !fact.category.is_empty() {
                seen.insert(fact.category.as_str());
            }
        }
        let mut categories: Vec<String> = seen.into_iter().map(str::to_string).collect();
        categories.sort();
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_fact_assigns_id_when_empty() {
        let store = SemanticStore::new();
        let fact = Fact::new("likes pineapple on pizza", "preference");
        let id = store.store_fact(fact).unwrap();
        assert!(!id.is_empty());
        assert_eq!(store.size(), 1);
    }

    /// Property #3 (§8): store then get returns the fact back modulo the
    /// auto-assigned id/timestamps.
    #[test]
    fn store_then_get_round_trips_content() {
        let store = SemanticStore::new();
        let fact = Fact::new("allergic to shellfish", "health")
            .with_source("user_stated")
            .with_confidence(0.95);

        let id = store.store_fact(fact.clone()).unwrap();
        let fetched = store.get_fact(&id).unwrap();

        assert_eq!(fetched.id, id);
        assert_eq!(fetched.content, fact.content);
        assert_eq!(fetched.category, fact.category);
        assert_eq!(fetched.source, fact.source);
        assert_eq!(fetched.confidence, fact.confidence);
    }

    #[test]
    fn store_fact_honors_caller_supplied_id() {
        let store = SemanticStore::new();
        let mut fact = Fact::new("born in 1990", "biography");
        fact.id = "bio-1".to_string();
        let id = store.store_fact(fact).unwrap();
        assert_eq!(id, "bio-1");
        assert!(store.get_fact("bio-1").is_some());
    }

    #[test]
    fn update_fact_missing_id_errors() {
        let store = SemanticStore::new();
        let fact = Fact::new("x", "y");
        let err = store.update_fact("nope", fact).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn update_fact_preserves_id_and_created_at() {
        let store = SemanticStore::new();
        let id = store.store_fact(Fact::new("original", "note")).unwrap();
        let original = store.get_fact(&id).unwrap();

        let updated = Fact::new("revised", "note");
        store.update_fact(&id, updated).unwrap();

        let after = store.get_fact(&id).unwrap();
        assert_eq!(after.id, id);
        assert_eq!(after.created_at, original.created_at);
        assert_eq!(after.content, "revised");
        assert!(after.updated_at >= original.updated_at);
    }

    #[test]
    fn delete_fact_missing_id_errors() {
        let store = SemanticStore::new();
        let err = store.delete_fact("nope").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn list_facts_exact_category_match() {
        let store = SemanticStore::new();
        store.store_fact(Fact::new("a", "preference")).unwrap();
        store.store_fact(Fact::new("b", "biography")).unwrap();
        store.store_fact(Fact::new("c", "preference")).unwrap();

        let prefs = store.list_facts("preference", 0);
        assert_eq!(prefs.len(), 2);
    }

    #[test]
    fn query_knowledge_filters_by_content_substring() {
        let store = SemanticStore::new();
        store.store_fact(Fact::new("allergic to peanuts", "health")).unwrap();
        store.store_fact(Fact::new("favorite color is blue", "preference")).unwrap();

        let results = store.query_knowledge("peanuts", 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "allergic to peanuts");
    }

    #[test]
    fn clear_empties_store() {
        let store = SemanticStore::new();
        store.store_fact(Fact::new("a", "b")).unwrap();
        store.clear();
        assert_eq!(store.size(), 0);
    }
}
