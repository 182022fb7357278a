//! Compat Engine - compatibility matching for questionnaire-driven pairing rounds
//!
//! Scores every pair of candidates from their questionnaire responses, gates
//! pairs on absolute and relative thresholds, and computes a globally optimal
//! one-to-one matching over the eligible pairs.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::config::{MatchingConfig, Settings};
pub use crate::core::{check_hard_filters, max_weight_matching, score_pair, Matcher};
pub use crate::error::{ConfigurationError, DataShapeError, EngineError, GraphInconsistencyError, StoreError};
pub use crate::models::{Candidate, MatchOutcome, MatchPair, PairScore, QuestionTable, RawCandidate, UnmatchedRecord};
pub use crate::services::{NoTextSimilarity, PrecomputedTextSimilarity, TextSimilaritySource};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let matcher = Matcher::with_default_config().unwrap();
        let outcome = matcher.run(&[], &NoTextSimilarity).unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.diagnostics.candidate_count, 0);
    }
}
