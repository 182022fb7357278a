// Core algorithm exports
pub mod blossom;
pub mod eligibility;
pub mod filters;
pub mod matcher;
pub mod normalize;
pub mod scoring;
pub mod similarity;

pub use blossom::max_weight_matching;
pub use eligibility::{apply_eligibility, best_scores, EligibilityOutcome, GateCheck};
pub use filters::{check_hard_filters, is_compatible_with_preference, HardFilterResult};
pub use matcher::{validate_matches, Matcher};
pub use normalize::Normalizer;
pub use scoring::{mutuality_score, score_pair, QuestionScore};
pub use similarity::similarity;
