use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::similarity::satisfaction;
use crate::models::question::{AGE, HARD_FILTER_ONLY};
use crate::models::{
    Candidate, FilterFailure, Preference, QuestionId, QuestionKind, QuestionResponse, QuestionSpec,
    QuestionTable,
};

/// Outcome of the binary pass/fail gate for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardFilterResult {
    pub passed: bool,
    pub reason: Option<FilterFailure>,
    #[serde(rename = "failedQuestions")]
    pub failed_questions: Vec<QuestionId>,
}

impl HardFilterResult {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            failed_questions: Vec::new(),
        }
    }

    fn fail(reason: FilterFailure) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
            failed_questions: Vec::new(),
        }
    }
}

/// Run every hard filter on a pair.
///
/// This is Stage 1 of the pipeline. Every check looks at both sides, so
/// the outcome does not depend on argument order.
pub fn check_hard_filters(a: &Candidate, b: &Candidate, table: &QuestionTable) -> HardFilterResult {
    if !gender_compatible(a, b) {
        return HardFilterResult::fail(FilterFailure::Gender);
    }
    if !campus_compatible(a, b) {
        return HardFilterResult::fail(FilterFailure::Campus);
    }
    if !age_compatible(a, b) {
        return HardFilterResult::fail(FilterFailure::Age);
    }

    let failed_questions = dealbreaker_failures(a, b, table);
    if !failed_questions.is_empty() {
        return HardFilterResult {
            passed: false,
            reason: Some(FilterFailure::Dealbreaker),
            failed_questions,
        };
    }

    HardFilterResult::pass()
}

/// Mutual interest; "anyone" satisfies a side outright.
#[inline]
pub fn gender_compatible(a: &Candidate, b: &Candidate) -> bool {
    a.is_interested_in(&b.gender) && b.is_interested_in(&a.gender)
}

/// Fails only when someone unwilling to cross campuses meets a different campus.
#[inline]
pub fn campus_compatible(a: &Candidate, b: &Candidate) -> bool {
    a.campus == b.campus || (a.ok_matching_different_campus && b.ok_matching_different_campus)
}

#[inline]
pub fn age_compatible(a: &Candidate, b: &Candidate) -> bool {
    accepts_age_of(a, b) && accepts_age_of(b, a)
}

fn accepts_age_of(me: &Candidate, peer: &Candidate) -> bool {
    let Some(Preference::SpecificRange { min, max }) = me.response(AGE).map(|r| &r.preference) else {
        return true;
    };
    match peer.response(AGE).and_then(|r| r.answer.as_number()) {
        Some(age) => Preference::range_contains(*min, *max, age),
        None => true,
    }
}

/// Whether `me` treats this question as a dealbreaker: an explicit flag,
/// or an importance at or above the question's conditional threshold.
pub fn acts_as_dealbreaker(spec: &QuestionSpec, response: &QuestionResponse) -> bool {
    response.is_dealbreaker
        || spec
            .hard_filter_at
            .map_or(false, |threshold| response.importance >= threshold)
}

/// Whether the peer's response is compatible with `me`'s preference.
///
/// Declining to answer, or not answering at all, is never compatible.
pub fn is_compatible_with_preference(
    spec: &QuestionSpec,
    me: &QuestionResponse,
    peer: Option<&QuestionResponse>,
) -> bool {
    if me.preference.is_doesnt_matter() {
        return true;
    }
    let Some(peer) = peer else {
        return false;
    };
    if peer.answer.is_prefer_not_to_answer() {
        return false;
    }

    let score = satisfaction(spec, me, peer);
    match me.preference {
        Preference::Similar | Preference::Different | Preference::Complement => score >= 0.5,
        _ => score >= 1.0 - f64::EPSILON,
    }
}

/// Questions on which either side's dealbreaker is violated, in id order.
pub fn dealbreaker_failures(a: &Candidate, b: &Candidate, table: &QuestionTable) -> Vec<QuestionId> {
    let answered: BTreeSet<&str> = a
        .responses
        .keys()
        .chain(b.responses.keys())
        .map(String::as_str)
        .filter(|id| !HARD_FILTER_ONLY.contains(id))
        .collect();

    answered
        .into_iter()
        .filter_map(|id| table.get(id))
        .filter(|spec| !matches!(spec.kind, QuestionKind::FreeText | QuestionKind::HardFilter))
        .filter(|spec| !side_satisfied(spec, a, b) || !side_satisfied(spec, b, a))
        .map(|spec| spec.id.clone())
        .collect()
}

fn side_satisfied(spec: &QuestionSpec, me: &Candidate, peer: &Candidate) -> bool {
    match me.response(&spec.id) {
        Some(mine) if acts_as_dealbreaker(spec, mine) => {
            let ok = is_compatible_with_preference(spec, mine, peer.response(&spec.id));
            if !ok {
                tracing::debug!(
                    question = %spec.id,
                    candidate = %me.id,
                    peer = %peer.id,
                    "dealbreaker violated"
                );
            }
            ok
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerValue, Gender, GenderTarget, Importance};
    use std::collections::BTreeMap;

    fn create_candidate(id: &str, gender: Gender, interested: &[GenderTarget]) -> Candidate {
        Candidate {
            id: id.to_string(),
            gender,
            interested_in: interested.iter().cloned().collect(),
            campus: "north".to_string(),
            ok_matching_different_campus: false,
            responses: BTreeMap::new(),
        }
    }

    fn man_for_women(id: &str) -> Candidate {
        create_candidate(id, Gender::Man, &[GenderTarget::Specific(Gender::Woman)])
    }

    fn woman_for_men(id: &str) -> Candidate {
        create_candidate(id, Gender::Woman, &[GenderTarget::Specific(Gender::Man)])
    }

    fn with_age(mut candidate: Candidate, age: f64, min: Option<f64>, max: Option<f64>) -> Candidate {
        candidate.responses.insert(
            AGE.to_string(),
            QuestionResponse::new(AnswerValue::Number(age), Preference::SpecificRange { min, max }),
        );
        candidate
    }

    #[test]
    fn test_mutual_gender_passes() {
        let table = QuestionTable::builtin().unwrap();
        let result = check_hard_filters(&man_for_women("a"), &woman_for_men("b"), &table);
        assert!(result.passed);
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_one_sided_gender_fails() {
        let table = QuestionTable::builtin().unwrap();
        let a = man_for_women("a");
        let b = man_for_women("b");
        let result = check_hard_filters(&a, &b, &table);
        assert!(!result.passed);
        assert_eq!(result.reason, Some(FilterFailure::Gender));
    }

    #[test]
    fn test_prefer_not_to_say_requires_wildcard_on_both_sides() {
        let table = QuestionTable::builtin().unwrap();
        let open = create_candidate("a", Gender::PreferNotToSay, &[GenderTarget::Anyone]);
        let also_open = create_candidate("b", Gender::PreferNotToSay, &[GenderTarget::Anyone]);
        assert!(check_hard_filters(&open, &also_open, &table).passed);

        let picky = create_candidate(
            "c",
            Gender::PreferNotToSay,
            &[GenderTarget::Specific(Gender::PreferNotToSay), GenderTarget::Specific(Gender::Woman)],
        );
        assert!(!check_hard_filters(&open, &picky, &table).passed);
    }

    #[test]
    fn test_campus_unwillingness_on_either_side() {
        let table = QuestionTable::builtin().unwrap();
        let a = man_for_women("a");
        let mut b = woman_for_men("b");
        b.campus = "south".to_string();
        b.ok_matching_different_campus = true;
        assert_eq!(check_hard_filters(&a, &b, &table).reason, Some(FilterFailure::Campus));
        assert_eq!(check_hard_filters(&b, &a, &table).reason, Some(FilterFailure::Campus));

        let mut a = a;
        a.ok_matching_different_campus = true;
        assert!(check_hard_filters(&a, &b, &table).passed);
    }

    #[test]
    fn test_age_ranges_both_directions() {
        let table = QuestionTable::builtin().unwrap();
        let a = with_age(man_for_women("a"), 30.0, Some(25.0), Some(35.0));
        let b = with_age(woman_for_men("b"), 24.0, None, None);
        assert_eq!(check_hard_filters(&a, &b, &table).reason, Some(FilterFailure::Age));
        assert_eq!(check_hard_filters(&b, &a, &table).reason, Some(FilterFailure::Age));

        let b = with_age(woman_for_men("b"), 26.0, Some(28.0), None);
        assert!(check_hard_filters(&a, &b, &table).passed);
    }

    #[test]
    fn test_missing_age_is_unrestricted() {
        let table = QuestionTable::builtin().unwrap();
        let a = with_age(man_for_women("a"), 30.0, Some(25.0), Some(35.0));
        let b = woman_for_men("b");
        assert!(check_hard_filters(&a, &b, &table).passed);
    }

    #[test]
    fn test_prefer_not_to_answer_fails_dealbreaker() {
        let table = QuestionTable::builtin().unwrap();
        let mut a = man_for_women("a");
        a.responses.insert(
            "religion".to_string(),
            QuestionResponse::new(AnswerValue::Text("jewish".into()), Preference::Same).dealbreaker(),
        );
        let mut b = woman_for_men("b");
        b.responses.insert(
            "religion".to_string(),
            QuestionResponse::new(AnswerValue::Text("prefer_not_to_answer".into()), Preference::DoesntMatter),
        );
        let result = check_hard_filters(&a, &b, &table);
        assert!(!result.passed);
        assert_eq!(result.failed_questions, vec!["religion".to_string()]);
    }

    #[test]
    fn test_conditional_hard_filter_on_sensitive_question() {
        let table = QuestionTable::builtin().unwrap();
        let mut a = man_for_women("a");
        let mut b = woman_for_men("b");
        b.responses.insert(
            "ethnicity".to_string(),
            QuestionResponse::new(AnswerValue::Text("korean".into()), Preference::DoesntMatter),
        );

        // Important is not enough for the sensitive question
        a.responses.insert(
            "ethnicity".to_string(),
            QuestionResponse::new(AnswerValue::Text("irish".into()), Preference::Same)
                .with_importance(Importance::Important),
        );
        assert!(check_hard_filters(&a, &b, &table).passed);

        a.responses.insert(
            "ethnicity".to_string(),
            QuestionResponse::new(AnswerValue::Text("irish".into()), Preference::Same)
                .with_importance(Importance::VeryImportant),
        );
        let result = check_hard_filters(&a, &b, &table);
        assert_eq!(result.reason, Some(FilterFailure::Dealbreaker));
        assert_eq!(result.failed_questions, vec!["ethnicity".to_string()]);
    }

    fn substance(used: &[&str], frequency: Option<&str>) -> AnswerValue {
        AnswerValue::Substance {
            substances: used.iter().map(|s| s.to_string()).collect(),
            frequency: frequency.map(str::to_string),
        }
    }

    #[test]
    fn test_conditional_hard_filter_on_compound_question() {
        let table = QuestionTable::builtin().unwrap();
        let mut a = man_for_women("a");
        let mut b = woman_for_men("b");
        b.responses.insert(
            "substance_use".to_string(),
            QuestionResponse::new(substance(&["cannabis"], Some("weekly")), Preference::DoesntMatter),
        );

        let sober = |importance| {
            QuestionResponse::new(substance(&[], None), Preference::Same).with_importance(importance)
        };

        a.responses.insert("substance_use".to_string(), sober(Importance::Somewhat));
        assert!(check_hard_filters(&a, &b, &table).passed);

        for importance in [Importance::Important, Importance::VeryImportant] {
            a.responses.insert("substance_use".to_string(), sober(importance));
            let result = check_hard_filters(&a, &b, &table);
            assert_eq!(result.reason, Some(FilterFailure::Dealbreaker));
            assert_eq!(result.failed_questions, vec!["substance_use".to_string()]);
        }
    }

    #[test]
    fn test_declined_answer_fails_dealbreaker_in_every_shape() {
        let table = QuestionTable::builtin().unwrap();
        let mut a = man_for_women("a");
        a.responses.insert(
            "substance_use".to_string(),
            QuestionResponse::new(substance(&["alcohol"], Some("weekly")), Preference::Less).dealbreaker(),
        );
        a.responses.insert(
            "weekend_activities".to_string(),
            QuestionResponse::new(AnswerValue::Set(BTreeSet::from(["hiking".to_string()])), Preference::Similar)
                .dealbreaker(),
        );

        let declined = BTreeSet::from(["prefer_not_to_answer".to_string()]);
        let shapes = [
            ("substance_use", substance(&["prefer_not_to_answer"], None)),
            ("substance_use", AnswerValue::Text("prefer_not_to_answer".into())),
            ("weekend_activities", AnswerValue::Set(declined)),
        ];
        for (question, answer) in shapes {
            let mut b = woman_for_men("b");
            b.responses.insert(
                question.to_string(),
                QuestionResponse::new(answer.clone(), Preference::DoesntMatter),
            );
            let result = check_hard_filters(&a, &b, &table);
            assert!(!result.passed, "{answer:?} passed a dealbreaker");
            assert!(result.failed_questions.contains(&question.to_string()));
        }
    }

    #[test]
    fn test_dealbreaker_outcome_is_symmetric() {
        let table = QuestionTable::builtin().unwrap();
        let mut a = man_for_women("a");
        a.responses.insert(
            "exercise_frequency".to_string(),
            QuestionResponse::new(AnswerValue::Text("daily".into()), Preference::More).dealbreaker(),
        );
        let mut b = woman_for_men("b");
        b.responses.insert(
            "exercise_frequency".to_string(),
            QuestionResponse::new(AnswerValue::Text("rarely".into()), Preference::Similar),
        );
        let ab = check_hard_filters(&a, &b, &table);
        let ba = check_hard_filters(&b, &a, &table);
        assert!(!ab.passed);
        assert_eq!(ab, ba);
    }
}
