//! Importance scorer (§4.1). Pure function of a message and the
//! configured weights — no I/O, no locks.

use memory_core::{ImportanceWeights, Message};
use regex::Regex;
use std::sync::OnceLock;

const EXPLICIT_REMEMBER_PHRASES: &[&str] = &[
    "remember",
    "don't forget",
    "important",
    "keep in mind",
    "note that",
    "make sure",
    "always",
    "never forget",
];

const PERSONAL_INFO_SUBSTRINGS: &[&str] = &[
    "my name is",
    "i'm ",
    "i am ",
    "call me ",
    "this is ",
];

const PERSONAL_INFO_KEYWORDS: &[&str] = &[
    "birthday",
    "allergic",
    "allergy",
    "prefer",
    "favorite",
    "favourite",
    "address",
    "live in",
    "live at",
    "born in",
    "born on",
    "age is",
    "years old",
    "work at",
    "work for",
    "employed",
    "graduated",
    "studied",
    "my email",
    "my phone",
    "contact me",
];

const QUESTION_WORDS: &[&str] = &["what", "where", "when", "why", "who", "how", "which"];

const LENGTH_THRESHOLD: usize = 200;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("valid email regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (\+\d{1,3}[\s.\-]?)?                 # optional international code
            (\(\d{3}\)\s?|\d{3}[\s.\-])           # area code
            \d{3}[\s.\-]?\d{4}                    # NNN-NNNN
            | \d{3}[\s.\-]\d{4}                   # NNN-NNNN short form
            ",
        )
        .expect("valid phone regex")
    })
}

fn question_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alt = QUESTION_WORDS.join("|");
        Regex::new(&format!(r"(?i)^\s*\b({alt})\b")).expect("valid question-word regex")
    })
}

/// Maps a message plus weights to a score in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceScorer;

impl ImportanceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Compute the raw weighted-sum importance for `msg` under `weights`,
    /// before normalization. Empty content always scores 0; a nil/empty
    /// metadata map simply makes every metadata-dependent predicate
    /// evaluate false. §3 has the episodic store gate admission and
    /// retain importance on this pre-normalized scale, not the bounded
    /// `[0, 1]` one `score` returns.
    pub fn raw_score(&self, msg: &Message, weights: &ImportanceWeights) -> f64 {
        if msg.content.is_empty() {
            return 0.0;
        }

        let content_lower = msg.content.to_lowercase();
        let mut sum = 0.0;

        if Self::has_explicit_remember(&content_lower) {
            sum += weights.explicit_remember;
        }
        if Self::has_personal_info(&content_lower) {
            sum += weights.personal_info;
        }
        if Self::is_question(&msg.content) {
            sum += weights.question_answer;
        }
        if msg.content.len() > LENGTH_THRESHOLD {
            sum += weights.length;
        }
        if msg.metadata.bool_flag("successful_action") {
            sum += weights.successful_action;
        }
        if msg.metadata.int("reference_count").is_some_and(|c| c > 1) {
            sum += weights.referenced_count;
        }
        if msg.metadata.bool_flag("emotional") {
            sum += weights.emotional_content;
        }

        sum
    }

    /// Compute the importance score for `msg` under `weights`, normalized
    /// to `[0, 1]` per §4.1. Callers needing the raw pre-normalized sum
    /// (episodic admission/storage, §3) should use `raw_score` instead.
    pub fn score(&self, msg: &Message, weights: &ImportanceWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        (self.raw_score(msg, weights) / total).clamp(0.0, 1.0)
    }

    fn has_explicit_remember(content_lower: &str) -> bool {
        EXPLICIT_REMEMBER_PHRASES
            .iter()
            .any(|phrase| content_lower.contains(phrase))
    }

    fn has_personal_info(content_lower: &str) -> bool {
        if email_re().is_match(content_lower) || phone_re().is_match(content_lower) {
            return true;
        }
        if PERSONAL_INFO_SUBSTRINGS
            .iter()
            .any(|s| content_lower.contains(s))
        {
            return true;
        }
        PERSONAL_INFO_KEYWORDS
            .iter()
            .any(|k| content_lower.contains(k))
    }

    fn is_question(content: &str) -> bool {
        let trimmed = content.trim_end();
        if trimmed.ends_with('?') {
            return true;
        }
        question_word_re().is_match(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_core::{Metadata, Role};

    fn msg(content: &str) -> Message {
        Message::new(Role::User, content)
    }

    #[test]
    fn empty_content_scores_zero() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        assert_eq!(scorer.score(&msg(""), &weights), 0.0);
    }

    #[test]
    fn explicit_remember_contributes() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let score = scorer.score(&msg("please remember this detail"), &weights);
        assert!(score > 0.0);
        assert!(score <= 1.0);
    }

    #[test]
    fn personal_info_email_detected() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let score = scorer.score(&msg("you can reach me at jane@example.com"), &weights);
        assert!(score > 0.0);
    }

    #[test]
    fn personal_info_phone_detected() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let score = scorer.score(&msg("call me at 555-123-4567"), &weights);
        assert!(score > 0.0);
    }

    #[test]
    fn question_detected_by_suffix() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let score = scorer.score(&msg("What's the weather like?"), &weights);
        assert!(score > 0.0);
    }

    #[test]
    fn casual_greeting_scores_low() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let score = scorer.score(&msg("Hello, how are you?"), &weights);
        // matches the question predicate only
        assert!((score - weights.question_answer / weights.total()).abs() < 1e-9);
    }

    #[test]
    fn metadata_flags_contribute() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let mut metadata = Metadata::new();
        metadata.insert("successful_action", true);
        metadata.insert("emotional", true);
        metadata.insert("reference_count", 3);
        let m = msg("task completed").with_metadata(metadata);
        let score = scorer.score(&m, &weights);
        let expected = (weights.successful_action + weights.referenced_count + weights.emotional_content)
            / weights.total();
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn score_always_in_unit_interval() {
        let scorer = ImportanceScorer::new();
        let weights = ImportanceWeights::default();
        let mut metadata = Metadata::new();
        metadata.insert("successful_action", true);
        metadata.insert("emotional", true);
        metadata.insert("reference_count", 5);
        let content = "Remember: my name is John, my email is john@example.com, call me at 555-123-4567 and this is a very long message that exceeds two hundred characters in length so that the length feature also contributes to the overall importance score computed here.";
        let m = msg(content).with_metadata(metadata);
        let score = scorer.score(&m, &weights);
        assert!((0.0..=1.0).contains(&score));
    }
}
