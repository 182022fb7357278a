//! Question table: the static mapping from question id to section and
//! similarity semantics. Loaded once from TOML and resolved into typed
//! variants so the scoring code dispatches with `match`, never on strings.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::ConfigurationError;
use crate::models::domain::{AnswerValue, Importance};

pub const GENDER_IDENTITY: &str = "gender_identity";
pub const GENDER_PREFERENCE: &str = "gender_preference";
pub const AGE: &str = "age";

/// Questions that only feed the hard filters and are never scored.
pub const HARD_FILTER_ONLY: [&str; 3] = [GENDER_IDENTITY, GENDER_PREFERENCE, AGE];

const BUILTIN_TABLE: &str = include_str!("../../config/questions.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Lifestyle,
    Personality,
    HardFilter,
}

/// Ordered option list, or a numeric range, used for distance scoring
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    options: Vec<String>,
    numeric: Option<(f64, f64)>,
}

impl Scale {
    pub fn ordinal<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            numeric: None,
        }
    }

    pub fn numeric(lo: f64, hi: f64) -> Self {
        Self {
            options: Vec::new(),
            numeric: Some((lo, hi)),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric.is_some()
    }

    /// Position of an answer on the scale: option index, or the raw number
    /// for numeric scales.
    pub fn position(&self, answer: &AnswerValue) -> Option<f64> {
        if self.numeric.is_some() {
            return answer.as_number();
        }
        let text = answer.as_text()?;
        self.options
            .iter()
            .position(|o| o == text)
            .map(|i| i as f64)
    }

    /// Position of a bare option token.
    pub fn index_of(&self, token: &str) -> Option<f64> {
        self.options.iter().position(|o| o == token).map(|i| i as f64)
    }

    /// Largest possible distance between two positions.
    pub fn span(&self) -> f64 {
        match self.numeric {
            Some((lo, hi)) => (hi - lo).abs(),
            None => self.options.len().saturating_sub(1) as f64,
        }
    }
}

/// Fixed compatibility matrix over named strategies
#[derive(Debug, Clone, PartialEq)]
pub struct CompatMatrix {
    options: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CompatMatrix {
    pub fn lookup(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.options.iter().position(|o| o == a)?;
        let j = self.options.iter().position(|o| o == b)?;
        Some(self.values[i][j])
    }
}

/// Per-question similarity semantics
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    Categorical,
    Ordinal(Scale),
    MultiSelect,
    SingleVsMulti,
    /// Compound `{substance, frequency}`; the scale orders frequencies.
    Substance(Scale),
    Directional(Scale),
    Different { complements: BTreeSet<(String, String)> },
    LoveLanguages,
    ConflictMatrix(CompatMatrix),
    /// Scored by the external text-similarity collaborator.
    FreeText,
    HardFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSpec {
    pub id: String,
    pub section: Section,
    pub kind: QuestionKind,
    /// Answer token that satisfies any peer ("flexible").
    pub wildcard: Option<String>,
    /// Importance at which the question acts as a dealbreaker even
    /// without an explicit flag.
    pub hard_filter_at: Option<Importance>,
}

impl QuestionSpec {
    pub fn is_wildcard(&self, answer: &AnswerValue) -> bool {
        match (&self.wildcard, answer) {
            (Some(w), AnswerValue::Text(t)) => w == t,
            (Some(w), AnswerValue::Set(set)) => set.contains(w),
            _ => false,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.section != Section::HardFilter
    }
}

#[derive(Debug, Deserialize)]
struct QuestionTableFile {
    #[serde(rename = "question", default)]
    questions: Vec<QuestionDef>,
}

/// Raw question definition as written in the TOML table
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDef {
    pub id: String,
    pub section: String,
    pub kind: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub numeric_range: Option<[f64; 2]>,
    #[serde(default)]
    pub wildcard: Option<String>,
    #[serde(default)]
    pub complements: Vec<[String; 2]>,
    #[serde(default)]
    pub matrix: Vec<Vec<f64>>,
    #[serde(default)]
    pub hard_filter_at: Option<Importance>,
}

impl QuestionDef {
    fn malformed(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::MalformedQuestion {
            question: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn scale(&self) -> Result<Scale, ConfigurationError> {
        match self.numeric_range {
            Some([lo, hi]) if hi > lo => Ok(Scale::numeric(lo, hi)),
            Some(_) => Err(self.malformed("numeric_range must be ascending")),
            None if self.options.len() >= 2 => Ok(Scale::ordinal(self.options.clone())),
            None => Err(self.malformed("needs at least two options or a numeric_range")),
        }
    }

    fn resolve(&self) -> Result<QuestionSpec, ConfigurationError> {
        let section = match self.section.as_str() {
            "lifestyle" => Section::Lifestyle,
            "personality" => Section::Personality,
            "hard_filter" => Section::HardFilter,
            other => {
                return Err(ConfigurationError::UnknownSection {
                    question: self.id.clone(),
                    section: other.to_string(),
                })
            }
        };

        let kind = match self.kind.as_str() {
            "categorical" => QuestionKind::Categorical,
            "ordinal" => QuestionKind::Ordinal(self.scale()?),
            "multi_select" => QuestionKind::MultiSelect,
            "single_vs_multi" => QuestionKind::SingleVsMulti,
            "substance" => QuestionKind::Substance(self.scale()?),
            "directional" => QuestionKind::Directional(self.scale()?),
            "different" => QuestionKind::Different {
                complements: self
                    .complements
                    .iter()
                    .map(|[a, b]| (a.clone(), b.clone()))
                    .collect(),
            },
            "love_languages" => QuestionKind::LoveLanguages,
            "conflict_matrix" => {
                let n = self.options.len();
                if n == 0 || self.matrix.len() != n || self.matrix.iter().any(|row| row.len() != n) {
                    return Err(self.malformed(format!("matrix must be {n}x{n}")));
                }
                if self.matrix.iter().flatten().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err(self.malformed("matrix values must lie in [0, 1]"));
                }
                QuestionKind::ConflictMatrix(CompatMatrix {
                    options: self.options.clone(),
                    values: self.matrix.clone(),
                })
            }
            "free_text" => QuestionKind::FreeText,
            "hard_filter" => QuestionKind::HardFilter,
            other => {
                return Err(ConfigurationError::UnknownQuestionType {
                    question: self.id.clone(),
                    kind: other.to_string(),
                })
            }
        };

        if (section == Section::HardFilter) != (kind == QuestionKind::HardFilter) {
            return Err(self.malformed("hard_filter kind and section must go together"));
        }

        Ok(QuestionSpec {
            id: self.id.clone(),
            section,
            kind,
            wildcard: self.wildcard.clone(),
            hard_filter_at: self.hard_filter_at,
        })
    }
}

/// Resolved, validated question table
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionTable {
    questions: BTreeMap<String, QuestionSpec>,
}

impl QuestionTable {
    /// The table shipped with the engine.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigurationError> {
        let file: QuestionTableFile = toml::from_str(raw)?;
        Self::from_defs(file.questions)
    }

    pub fn from_defs(defs: Vec<QuestionDef>) -> Result<Self, ConfigurationError> {
        let mut questions = BTreeMap::new();
        for def in defs {
            let spec = def.resolve()?;
            if questions.insert(spec.id.clone(), spec).is_some() {
                return Err(ConfigurationError::DuplicateQuestion { question: def.id });
            }
        }

        for section in [Section::Lifestyle, Section::Personality] {
            if !questions.values().any(|q: &QuestionSpec| q.section == section) {
                return Err(ConfigurationError::MalformedQuestion {
                    question: format!("{section:?}"),
                    reason: "section has no questions".to_string(),
                });
            }
        }

        Ok(Self { questions })
    }

    pub fn get(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions.get(id)
    }

    /// All questions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.questions.values()
    }

    /// Questions that contribute to section scores, in id order.
    pub fn scored(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.iter().filter(|q| q.is_scored())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
