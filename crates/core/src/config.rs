//! Runtime configuration for the memory system.

use serde::{Deserialize, Serialize};

/// How the compressor turns overflowing working-store messages into a
/// placeholder. `Llm` is a documented future extension (§9): it must
/// never fail the surrounding compress call, falling back to `Simple` on
/// provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationMode {
    None,
    Simple,
    Llm,
}

impl Default for SummarizationMode {
    fn default() -> Self {
        SummarizationMode::Simple
    }
}

/// The seven named weights the importance scorer sums (§4.1). Defaults
/// match the reference weights exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceWeights {
    pub explicit_remember: f64,
    pub personal_info: f64,
    pub question_answer: f64,
    pub length: f64,
    pub successful_action: f64,
    pub referenced_count: f64,
    pub emotional_content: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            explicit_remember: 1.0,
            personal_info: 0.8,
            question_answer: 0.4,
            length: 0.3,
            successful_action: 0.7,
            referenced_count: 0.5,
            emotional_content: 0.6,
        }
    }
}

impl ImportanceWeights {
    pub fn total(&self) -> f64 {
        self.explicit_remember
            + self.personal_info
            + self.question_answer
            + self.length
            + self.successful_action
            + self.referenced_count
            + self.emotional_content
    }
}

/// Top-level knobs for the orchestrator and its three tiers. Mutable at
/// runtime via `MemorySystem::set_config`; a change to `working_capacity`
/// does not retroactively resize an already-constructed working store
/// (§4.5 — document, don't silently reshape live state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub working_capacity: usize,
    pub summarization_mode: SummarizationMode,

    pub episodic_enabled: bool,
    pub episodic_threshold: f64,
    /// 0 = unlimited.
    pub episodic_max_size: usize,

    pub semantic_enabled: bool,
    pub semantic_auto_learn: bool,

    pub auto_compress: bool,
    /// Defaults to `working_capacity` when unset by the builder.
    pub compression_threshold: usize,
    pub compression_interval: usize,

    pub importance_scoring: bool,
    pub importance_weights: ImportanceWeights,

    pub deduplication_enabled: bool,
    pub similarity_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        let working_capacity = 50;
        Self {
            working_capacity,
            summarization_mode: SummarizationMode::Simple,
            episodic_enabled: true,
            episodic_threshold: 0.5,
            episodic_max_size: 0,
            semantic_enabled: true,
            semantic_auto_learn: false,
            auto_compress: true,
            compression_threshold: working_capacity,
            compression_interval: 1,
            importance_scoring: true,
            importance_weights: ImportanceWeights::default(),
            deduplication_enabled: true,
            similarity_threshold: 0.95,
        }
    }
}
