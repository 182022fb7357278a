// Service exports
pub mod review;
pub mod store;
pub mod text_similarity;

pub use review::{build_shortlist, shortlists_for_unmatched, ReviewPartner, ReviewShortlist};
pub use store::{BatchRecord, JsonFileStore, MatchStore};
pub use text_similarity::{NoTextSimilarity, PrecomputedTextSimilarity, TextSimilaritySource};
