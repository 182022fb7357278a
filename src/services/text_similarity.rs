use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::EngineError;

/// Supplier of free-text similarity for a pair.
///
/// Returning `None` means no score is available; the question is then
/// treated as unanswered for that pair rather than failing the run.
pub trait TextSimilaritySource: Sync {
    fn score(&self, question: &str, a: &str, b: &str) -> Option<f64>;
}

/// Used when no text-similarity collaborator is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextSimilarity;

impl TextSimilaritySource for NoTextSimilarity {
    fn score(&self, _question: &str, _a: &str, _b: &str) -> Option<f64> {
        None
    }
}

/// One pre-computed score as exchanged with the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSimilarityEntry {
    pub question: String,
    #[serde(alias = "aId")]
    pub a: String,
    #[serde(alias = "bId")]
    pub b: String,
    pub score: f64,
}

/// Scores computed ahead of the run, keyed by question and unordered pair
#[derive(Debug, Clone, Default)]
pub struct PrecomputedTextSimilarity {
    scores: BTreeMap<(String, String, String), f64>,
}

impl PrecomputedTextSimilarity {
    fn key(question: &str, a: &str, b: &str) -> (String, String, String) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        (question.to_string(), lo.to_string(), hi.to_string())
    }

    pub fn insert(&mut self, question: &str, a: &str, b: &str, score: f64) {
        self.scores.insert(Self::key(question, a, b), score.clamp(0.0, 1.0));
    }

    pub fn from_entries<I: IntoIterator<Item = TextSimilarityEntry>>(entries: I) -> Self {
        let mut source = Self::default();
        for entry in entries {
            source.insert(&entry.question, &entry.a, &entry.b, entry.score);
        }
        source
    }

    /// Load a JSON array of entries.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::InputIo {
            path: path.display().to_string(),
            source,
        })?;
        let entries: Vec<TextSimilarityEntry> = serde_json::from_str(&raw)?;
        tracing::info!(entries = entries.len(), path = %path.display(), "Loaded text similarity scores");
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl TextSimilaritySource for PrecomputedTextSimilarity {
    fn score(&self, question: &str, a: &str, b: &str) -> Option<f64> {
        self.scores.get(&Self::key(question, a, b)).copied()
    }
}
