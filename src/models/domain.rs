use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ImportanceScale;

pub type QuestionId = String;

/// Answer token meaning the candidate declined to answer.
pub const PREFER_NOT_TO_ANSWER: &str = "prefer_not_to_answer";

/// Substance token meaning the candidate uses nothing.
pub const NO_SUBSTANCE: &str = "none";

/// A candidate's answer to one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Set(BTreeSet<String>),
    LoveLanguages {
        show: BTreeSet<String>,
        receive: BTreeSet<String>,
    },
    Substance {
        substances: BTreeSet<String>,
        frequency: Option<String>,
    },
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            AnswerValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// View the answer as a set; scalars become singletons.
    pub fn to_set(&self) -> BTreeSet<String> {
        match self {
            AnswerValue::Text(s) => BTreeSet::from([s.clone()]),
            AnswerValue::Number(n) => BTreeSet::from([n.to_string()]),
            AnswerValue::Set(set) => set.clone(),
            AnswerValue::LoveLanguages { show, receive } => show.union(receive).cloned().collect(),
            AnswerValue::Substance { substances, .. } => substances.clone(),
        }
    }

    pub fn is_prefer_not_to_answer(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s == PREFER_NOT_TO_ANSWER,
            AnswerValue::Set(set) | AnswerValue::Substance { substances: set, .. } => {
                set.len() == 1 && set.contains(PREFER_NOT_TO_ANSWER)
            }
            _ => false,
        }
    }
}

/// What a candidate wants from the peer's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preference {
    Same,
    Similar,
    Different,
    More,
    Less,
    Complement,
    SpecificValues { values: BTreeSet<String> },
    SpecificRange { min: Option<f64>, max: Option<f64> },
    DoesntMatter,
}

impl Preference {
    pub fn is_doesnt_matter(&self) -> bool {
        matches!(self, Preference::DoesntMatter)
    }

    /// Range containment; `None` bounds do not restrict.
    pub fn range_contains(min: Option<f64>, max: Option<f64>, value: f64) -> bool {
        min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
    }
}

/// Declared importance of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    NotImportant,
    #[default]
    Somewhat,
    Important,
    VeryImportant,
}

impl Importance {
    pub const ALL: [Importance; 4] = [
        Importance::NotImportant,
        Importance::Somewhat,
        Importance::Important,
        Importance::VeryImportant,
    ];

    pub fn weight(self, scale: &ImportanceScale) -> f64 {
        match self {
            Importance::NotImportant => scale.not_important,
            Importance::Somewhat => scale.somewhat,
            Importance::Important => scale.important,
            Importance::VeryImportant => scale.very_important,
        }
    }

    /// Snap a raw numeric weight to the closest level on the scale.
    /// Values outside the scale are clamped first.
    pub fn from_weight(raw: f64, scale: &ImportanceScale) -> Importance {
        let clamped = raw.clamp(scale.not_important, scale.very_important);
        let mut best = Importance::Somewhat;
        let mut best_gap = f64::INFINITY;
        for level in Importance::ALL {
            let gap = (level.weight(scale) - clamped).abs();
            if gap < best_gap {
                best = level;
                best_gap = gap;
            }
        }
        best
    }
}

/// Canonical per-question response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub answer: AnswerValue,
    pub preference: Preference,
    #[serde(default)]
    pub importance: Importance,
    #[serde(rename = "isDealbreaker", default)]
    pub is_dealbreaker: bool,
}

impl QuestionResponse {
    pub fn new(answer: AnswerValue, preference: Preference) -> Self {
        Self {
            answer,
            preference,
            importance: Importance::default(),
            is_dealbreaker: false,
        }
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn dealbreaker(mut self) -> Self {
        self.is_dealbreaker = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Man,
    Woman,
    NonBinary,
    PreferNotToSay,
    Other(String),
}

/// One entry of a candidate's "interested in" set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderTarget {
    Anyone,
    Specific(Gender),
}

/// A user eligible to be matched in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub gender: Gender,
    #[serde(rename = "interestedInGenders")]
    pub interested_in: BTreeSet<GenderTarget>,
    pub campus: String,
    #[serde(rename = "okMatchingDifferentCampus")]
    pub ok_matching_different_campus: bool,
    pub responses: BTreeMap<QuestionId, QuestionResponse>,
}

impl Candidate {
    pub fn response(&self, question: &str) -> Option<&QuestionResponse> {
        self.responses.get(question)
    }

    pub fn accepts_anyone(&self) -> bool {
        self.interested_in.contains(&GenderTarget::Anyone)
    }

    /// Whether this candidate is open to someone of `gender`.
    pub fn is_interested_in(&self, gender: &Gender) -> bool {
        if self.accepts_anyone() {
            return true;
        }
        // Opting out of a gender label needs an explicit wildcard
        if *gender == Gender::PreferNotToSay {
            return false;
        }
        self.interested_in
            .contains(&GenderTarget::Specific(gender.clone()))
    }

    pub fn importance_weight(&self, question: &str, scale: &ImportanceScale) -> f64 {
        self.response(question)
            .map(|r| r.importance)
            .unwrap_or_default()
            .weight(scale)
    }
}
