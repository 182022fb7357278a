// Model exports
pub mod domain;
pub mod input;
pub mod question;
pub mod results;

pub use domain::{AnswerValue, Candidate, Gender, GenderTarget, Importance, Preference, QuestionId, QuestionResponse};
pub use input::RawCandidate;
pub use question::{QuestionKind, QuestionSpec, QuestionTable, Scale, Section};
pub use results::{
    EligibilityStats, EligiblePair, FilterFailure, HardFilterStats, MatchOutcome, MatchPair, NotMatchedBecause,
    PairDiagnostics, PairScore, PartnerExplanation, PipelineDiagnostics, ScoreStats, UnmatchedDetail,
    UnmatchedReason, UnmatchedRecord,
};
