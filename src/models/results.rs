use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::domain::QuestionId;

/// Why a pair failed the hard filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterFailure {
    Gender,
    Campus,
    Age,
    Dealbreaker,
}

impl FilterFailure {
    pub fn key(self) -> &'static str {
        match self {
            FilterFailure::Gender => "gender",
            FilterFailure::Campus => "campus",
            FilterFailure::Age => "age",
            FilterFailure::Dealbreaker => "dealbreaker",
        }
    }
}

impl fmt::Display for FilterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FilterFailure::Gender => "gender preferences are not mutual",
            FilterFailure::Campus => "campus preferences are incompatible",
            FilterFailure::Age => "age is outside the accepted range",
            FilterFailure::Dealbreaker => "a dealbreaker question is incompatible",
        };
        f.write_str(message)
    }
}

/// Diagnostics attached to a scored pair; never used for gating
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairDiagnostics {
    #[serde(rename = "mutualityPenalty")]
    pub mutuality_penalty: f64,
    #[serde(rename = "lowScoringQuestions")]
    pub low_scoring_questions: Vec<QuestionId>,
    #[serde(rename = "asymmetricQuestions")]
    pub asymmetric_questions: Vec<QuestionId>,
    #[serde(rename = "questionsScored")]
    pub questions_scored: usize,
}

/// Both directional scores of a pair and their symmetric combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    #[serde(rename = "aId")]
    pub a_id: String,
    #[serde(rename = "bId")]
    pub b_id: String,
    #[serde(rename = "scoreAtoB")]
    pub score_a_to_b: f64,
    #[serde(rename = "scoreBtoA")]
    pub score_b_to_a: f64,
    #[serde(rename = "pairScore")]
    pub pair_score: f64,
    pub diagnostics: PairDiagnostics,
}

impl PairScore {
    pub fn involves(&self, id: &str) -> bool {
        self.a_id == id || self.b_id == id
    }

    /// The other side of the pair, if `id` is one side.
    pub fn partner_of(&self, id: &str) -> Option<&str> {
        if self.a_id == id {
            Some(&self.b_id)
        } else if self.b_id == id {
            Some(&self.a_id)
        } else {
            None
        }
    }

    /// Directional score from `id`'s point of view.
    pub fn score_from(&self, id: &str) -> Option<f64> {
        if self.a_id == id {
            Some(self.score_a_to_b)
        } else if self.b_id == id {
            Some(self.score_b_to_a)
        } else {
            None
        }
    }
}

/// A pair that passed the eligibility gate; an edge of the matching graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligiblePair {
    #[serde(flatten)]
    pub score: PairScore,
}

/// Final output pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    #[serde(rename = "aId")]
    pub a_id: String,
    #[serde(rename = "bId")]
    pub b_id: String,
    pub score: PairScore,
}

/// Category shown to an unmatched candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Failed hard filters or the eligibility gate with everyone.
    NoEligiblePairs { all_failed_hard_filters: bool },
    /// The optimal matching paired the best eligible partner elsewhere.
    Outcompeted,
    /// The best eligible partner was left unmatched too.
    OddParity,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::NoEligiblePairs { all_failed_hard_filters: true } => {
                f.write_str("no one in this round met your basic requirements")
            }
            UnmatchedReason::NoEligiblePairs { all_failed_hard_filters: false } => {
                f.write_str("no one in this round was a strong enough match")
            }
            UnmatchedReason::Outcompeted => {
                f.write_str("your best matches were paired with someone else this round")
            }
            UnmatchedReason::OddParity => {
                f.write_str("the round had an odd number of compatible people")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRecord {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub reason: UnmatchedReason,
    #[serde(rename = "bestPossibleScore")]
    pub best_possible_score: Option<f64>,
    #[serde(rename = "bestPossibleMatchId")]
    pub best_possible_match_id: Option<String>,
}

/// Why one specific partner was not the match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "why", rename_all = "snake_case")]
pub enum NotMatchedBecause {
    FailedHardFilter {
        failure: FilterFailure,
    },
    FailedEligibility {
        absolute: bool,
        relative_self: bool,
        relative_partner: bool,
    },
    Outcompeted {
        partner_matched_with: String,
    },
    PartnerUnmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerExplanation {
    #[serde(rename = "partnerId")]
    pub partner_id: String,
    #[serde(rename = "pairScore")]
    pub pair_score: Option<f64>,
    pub reason: NotMatchedBecause,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedDetail {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "topPartners")]
    pub top_partners: Vec<PartnerExplanation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardFilterStats {
    pub pairs_considered: usize,
    pub pairs_filtered: usize,
    pub by_reason: BTreeMap<String, usize>,
}

/// Fixed buckets: 0-20, 20-40, 40-60, 60-80, 80-100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub pair_count: usize,
    pub mean_score: f64,
    pub histogram: [usize; 5],
}

impl ScoreStats {
    pub fn from_scores<I: IntoIterator<Item = f64>>(scores: I) -> Self {
        let mut stats = ScoreStats::default();
        let mut total = 0.0;
        for score in scores {
            let bucket = ((score / 20.0).floor().max(0.0) as usize).min(4);
            stats.histogram[bucket] += 1;
            stats.pair_count += 1;
            total += score;
        }
        if stats.pair_count > 0 {
            stats.mean_score = total / stats.pair_count as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibilityStats {
    pub eligible_pairs: usize,
    pub failed_absolute: usize,
    pub failed_relative_a: usize,
    pub failed_relative_b: usize,
    /// Scored pairs with others but none passed the gate.
    pub perfectionists: Vec<String>,
    /// No scored pairs at all.
    pub isolated: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub candidate_count: usize,
    pub dropped_responses: usize,
    pub hard_filter: HardFilterStats,
    pub scoring: ScoreStats,
    pub eligibility: EligibilityStats,
    pub match_count: usize,
    pub unmatched_count: usize,
    pub unmatched_details: Vec<UnmatchedDetail>,
    pub execution_time_ms: u64,
}

/// Result of one matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matches: Vec<MatchPair>,
    pub unmatched: Vec<UnmatchedRecord>,
    pub eligible: Vec<EligiblePair>,
    pub diagnostics: PipelineDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let stats = ScoreStats::from_scores([0.0, 19.9, 20.0, 55.0, 80.0, 100.0]);
        assert_eq!(stats.histogram, [2, 1, 1, 0, 2]);
        assert_eq!(stats.pair_count, 6);
    }

    #[test]
    fn test_reason_is_human_readable() {
        let reason = UnmatchedReason::Outcompeted;
        assert!(!reason.to_string().contains("Outcompeted"));
        assert!(FilterFailure::Gender.to_string().contains("gender"));
    }
}
