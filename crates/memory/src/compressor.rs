//! The compression pipeline (§4.5): drains working-store overflow into
//! episodic storage and reinserts a synthetic summary placeholder.
//!
//! Kept as a free function rather than a stateful type: the teacher's
//! `ExtractiveCompressor` carries its own scoring state because it picks
//! *which* sentences survive, but `SummarizationMode::Simple`/`None` need
//! no state of their own — the orchestrator already owns the tiers this
//! operates on.

use crate::episodic::EpisodicStore;
use crate::working::WorkingStore;
use memory_core::{Deadline, Result, ScoredMessage, SummarizationMode};

/// Outcome of one `compress` call, surfaced to callers as part of
/// `MemoryStats` bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionOutcome {
    pub compressed_count: usize,
    pub ran: bool,
}

/// Runs the §4.5 Compress operation once. A no-op when
/// `summarization_mode == None` or there is nothing over capacity.
///
/// `default_importance` backstops messages whose `importance` metadata
/// (stamped by the orchestrator at Add time) is missing —§9 leaves the
/// exact fallback value open; 0.5 (the midpoint) is the documented
/// choice.
pub async fn compress(
    working: &WorkingStore,
    episodic: &EpisodicStore,
    mode: SummarizationMode,
    default_importance: f64,
    episodic_enabled: bool,
    deadline: Deadline,
) -> Result<CompressionOutcome> {
    if mode == SummarizationMode::None {
        return Ok(CompressionOutcome::default());
    }

    let result = working.compress();
    if result.compressed.is_empty() {
        return Ok(CompressionOutcome::default());
    }

    let compressed_count = result.compressed.len();

    if episodic_enabled {
        let batch: Vec<ScoredMessage> = result
            .compressed
            .into_iter()
            .map(|msg| {
                let importance = msg.metadata.importance().unwrap_or(default_importance);
                ScoredMessage::new(msg, importance)
            })
            .collect();

        if let Err(err) = episodic.store_batch(batch, deadline).await {
            tracing::warn!(error = %err, "compression failed to archive overflow to episodic store");
        }
    }

    if let Some(summary) = result.summary {
        // Reinserting the placeholder uses the strict self-evicting
        // `add`, not `add_overflowing`: the working store must come back
        // under capacity (plus this one summary message) after a
        // successful compress, per §4.2's standalone contract.
        working.add(summary);
    }

    Ok(CompressionOutcome {
        compressed_count,
        ran: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_core::{Message, Role};

    fn msg(content: &str) -> Message {
        Message::new(Role::User, content)
    }

    #[tokio::test]
    async fn none_mode_is_a_noop() {
        let working = WorkingStore::new(2);
        for i in 0..4 {
            working.add_overflowing(msg(&format!("m{i}")));
        }
        let episodic = EpisodicStore::new(0);

        let outcome = compress(
            &working,
            &episodic,
            SummarizationMode::None,
            0.5,
            true,
            Deadline::none(),
        )
        .await
        .unwrap();

        assert!(!outcome.ran);
        assert_eq!(working.size(), 4);
        assert_eq!(episodic.size(), 0);
    }

    #[tokio::test]
    async fn under_capacity_is_a_noop() {
        let working = WorkingStore::new(5);
        working.add(msg("hello"));
        let episodic = EpisodicStore::new(0);

        let outcome = compress(
            &working,
            &episodic,
            SummarizationMode::Simple,
            0.5,
            true,
            Deadline::none(),
        )
        .await
        .unwrap();

        assert!(!outcome.ran);
        assert_eq!(episodic.size(), 0);
    }

    #[tokio::test]
    async fn overflow_moves_to_episodic_and_reinserts_summary() {
        let working = WorkingStore::new(3);
        for i in 0..5 {
            working.add_overflowing(msg(&format!("m{i}")));
        }

        let episodic = EpisodicStore::new(0);
        let outcome = compress(
            &working,
            &episodic,
            SummarizationMode::Simple,
            0.5,
            true,
            Deadline::none(),
        )
        .await
        .unwrap();

        assert!(outcome.ran);
        assert_eq!(outcome.compressed_count, 2);
        assert_eq!(episodic.size(), 2);
        // 3 remaining working messages plus the reinserted summary == 4.
        assert_eq!(working.size(), 4);

        let all = working.all();
        let summary = all.last().unwrap();
        assert!(summary.content.starts_with("[Compressed"));
    }

    #[tokio::test]
    async fn recovers_importance_from_metadata() {
        let working = WorkingStore::new(1);
        let mut important = msg("remember my birthday");
        important.metadata.set_importance(0.9);
        working.add_overflowing(important);
        working.add_overflowing(msg("plain overflow message"));

        let episodic = EpisodicStore::new(0);
        compress(
            &working,
            &episodic,
            SummarizationMode::Simple,
            0.5,
            true,
            Deadline::none(),
        )
        .await
        .unwrap();

        let stored = episodic.retrieve_by_importance(0.9, 10);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "remember my birthday");
    }
}
