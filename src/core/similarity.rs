use std::collections::BTreeSet;

use crate::models::domain::NO_SUBSTANCE;
use crate::models::question::CompatMatrix;
use crate::models::{AnswerValue, Preference, QuestionKind, QuestionResponse, QuestionSpec, Scale};

/// Partial credit when a directional want is not met.
const DIRECTIONAL_PARTIAL_CREDIT: f64 = 0.5;

/// Floor for "similar" multi-select answers that share anything at all.
const SIMILAR_OVERLAP_FLOOR: f64 = 0.5;

#[inline]
fn score_if(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

/// Jaccard index of two sets; 0 when both are empty
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn any_in(answer: &AnswerValue, values: &BTreeSet<String>) -> bool {
    answer.to_set().iter().any(|v| values.contains(v))
}

/// Symmetric similarity of two responses in [0, 1].
///
/// Missing data on either side scores 0; otherwise the result is the
/// smaller of the two one-sided satisfactions.
pub fn similarity(spec: &QuestionSpec, a: Option<&QuestionResponse>, b: Option<&QuestionResponse>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => satisfaction(spec, a, b).min(satisfaction(spec, b, a)),
        _ => 0.0,
    }
}

/// How well `peer`'s answer satisfies `me`'s preference, in [0, 1].
pub fn satisfaction(spec: &QuestionSpec, me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    if me.preference.is_doesnt_matter() {
        return 1.0;
    }
    if spec.is_wildcard(&me.answer) || spec.is_wildcard(&peer.answer) {
        return 1.0;
    }

    let score = match &spec.kind {
        QuestionKind::Categorical => categorical(me, peer),
        QuestionKind::Ordinal(scale) | QuestionKind::Directional(scale) => scaled(scale, me, peer),
        QuestionKind::MultiSelect => multi_select(me, peer),
        QuestionKind::SingleVsMulti => single_vs_multi(me, peer),
        QuestionKind::Substance(scale) => substance(scale, me, peer),
        QuestionKind::Different { complements } => different(complements, me, peer),
        QuestionKind::LoveLanguages => love_languages(me, peer),
        QuestionKind::ConflictMatrix(matrix) => conflict(matrix, me, peer),
        // Scored outside this stage
        QuestionKind::FreeText | QuestionKind::HardFilter => 0.0,
    };
    score.clamp(0.0, 1.0)
}

fn categorical(me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    match &me.preference {
        Preference::Different => score_if(me.answer != peer.answer),
        Preference::SpecificValues { values } => score_if(any_in(&peer.answer, values)),
        _ => score_if(me.answer == peer.answer),
    }
}

/// Ordinal, Likert and directional answers.
fn scaled(scale: &Scale, me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    if let Preference::SpecificValues { values } = &me.preference {
        return score_if(any_in(&peer.answer, values));
    }
    let (Some(mine), Some(theirs)) = (scale.position(&me.answer), scale.position(&peer.answer)) else {
        return categorical(me, peer);
    };
    distance_score(scale, &me.preference, mine, theirs)
}

/// Shared rule for answers that sit on a scale.
fn distance_score(scale: &Scale, preference: &Preference, mine: f64, theirs: f64) -> f64 {
    let span = scale.span();
    let ratio = if span > 0.0 { ((mine - theirs).abs() / span).min(1.0) } else { 0.0 };

    match preference {
        Preference::Same => score_if(ratio == 0.0),
        Preference::Different => score_if(ratio > 0.0),
        Preference::More => {
            if theirs >= mine { 1.0 } else { DIRECTIONAL_PARTIAL_CREDIT }
        }
        Preference::Less => {
            if theirs <= mine { 1.0 } else { DIRECTIONAL_PARTIAL_CREDIT }
        }
        Preference::Complement => ratio,
        Preference::SpecificRange { min, max } => score_if(Preference::range_contains(*min, *max, theirs)),
        Preference::DoesntMatter => 1.0,
        Preference::Similar | Preference::SpecificValues { .. } => 1.0 - ratio,
    }
}

fn multi_select(me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    let mine = me.answer.to_set();
    let theirs = peer.answer.to_set();
    let index = jaccard(&mine, &theirs);

    match &me.preference {
        Preference::SpecificValues { values } => score_if(theirs.iter().any(|v| values.contains(v))),
        Preference::Similar => {
            if mine.intersection(&theirs).next().is_some() {
                index.max(SIMILAR_OVERLAP_FLOOR)
            } else {
                index
            }
        }
        Preference::Different => 1.0 - index,
        _ => index,
    }
}

fn single_vs_multi(me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    let accepted = match &me.preference {
        Preference::SpecificValues { values } => values.clone(),
        _ => me.answer.to_set(),
    };
    let contained = any_in(&peer.answer, &accepted);
    match me.preference {
        Preference::Different => score_if(!contained),
        _ => score_if(contained),
    }
}

/// Whether every substance `peer` uses is on the allowed list.
pub fn substances_allowed(allowed: &BTreeSet<String>, used: &BTreeSet<String>) -> bool {
    if used.is_empty() {
        allowed.contains(NO_SUBSTANCE)
    } else {
        used.iter().all(|s| allowed.contains(s))
    }
}

fn substance(scale: &Scale, me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    let (
        AnswerValue::Substance { substances: mine, frequency: my_freq },
        AnswerValue::Substance { substances: theirs, frequency: their_freq },
    ) = (&me.answer, &peer.answer)
    else {
        return categorical(me, peer);
    };

    // Abstaining sits below every frequency on the scale
    let level = |used: &BTreeSet<String>, freq: &Option<String>| -> f64 {
        if used.is_empty() {
            -1.0
        } else {
            freq.as_deref().and_then(|f| scale.index_of(f)).unwrap_or(0.0)
        }
    };

    match &me.preference {
        Preference::More if level(theirs, their_freq) >= level(mine, my_freq) => return 1.0,
        Preference::Less if level(theirs, their_freq) <= level(mine, my_freq) => return 1.0,
        Preference::SpecificValues { values } => return score_if(substances_allowed(values, theirs)),
        _ => {}
    }

    match (mine.is_empty(), theirs.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let overlap = jaccard(mine, theirs);
            let proximity = match (
                my_freq.as_deref().and_then(|f| scale.index_of(f)),
                their_freq.as_deref().and_then(|f| scale.index_of(f)),
            ) {
                (Some(a), Some(b)) if scale.span() > 0.0 => 1.0 - (a - b).abs() / scale.span(),
                _ => 0.0,
            };
            (overlap + proximity) / 2.0
        }
    }
}

fn different(complements: &BTreeSet<(String, String)>, me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    let mine = me.answer.to_set();
    let theirs = peer.answer.to_set();

    match &me.preference {
        Preference::Different => 1.0 - jaccard(&mine, &theirs),
        Preference::Complement => {
            let paired = mine.iter().any(|x| {
                theirs.iter().any(|y| {
                    complements.contains(&(x.clone(), y.clone())) || complements.contains(&(y.clone(), x.clone()))
                })
            });
            score_if(paired)
        }
        Preference::SpecificValues { values } => score_if(theirs.iter().any(|v| values.contains(v))),
        Preference::Similar => jaccard(&mine, &theirs),
        _ => score_if(mine == theirs),
    }
}

/// Share of what `me` likes to receive that `peer` likes to show.
fn love_languages(me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    let (AnswerValue::LoveLanguages { receive, .. }, AnswerValue::LoveLanguages { show, .. }) =
        (&me.answer, &peer.answer)
    else {
        return 0.0;
    };
    if receive.is_empty() {
        return 0.0;
    }
    receive.intersection(show).count() as f64 / receive.len() as f64
}

fn conflict(matrix: &CompatMatrix, me: &QuestionResponse, peer: &QuestionResponse) -> f64 {
    match &me.preference {
        Preference::SpecificValues { values } => score_if(any_in(&peer.answer, values)),
        Preference::Different => score_if(me.answer != peer.answer),
        _ => match (me.answer.as_text(), peer.answer.as_text()) {
            (Some(mine), Some(theirs)) => matrix.lookup(mine, theirs).unwrap_or(0.0),
            _ => 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionTable;

    fn table() -> QuestionTable {
        QuestionTable::builtin().unwrap()
    }

    fn text(answer: &str, preference: Preference) -> QuestionResponse {
        QuestionResponse::new(AnswerValue::Text(answer.to_string()), preference)
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_missing_answer_scores_zero() {
        let table = table();
        let spec = table.get("religion").unwrap();
        let a = text("catholic", Preference::Same);
        assert_eq!(similarity(spec, Some(&a), None), 0.0);
        assert_eq!(similarity(spec, None, None), 0.0);
    }

    #[test]
    fn test_doesnt_matter_dominates() {
        let table = table();
        let spec = table.get("religion").unwrap();
        let a = text("catholic", Preference::DoesntMatter);
        let b = text("buddhist", Preference::Same);
        assert_eq!(satisfaction(spec, &a, &b), 1.0);
        // The peer still cares, so the symmetric score is theirs
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 0.0);

        let b = text("buddhist", Preference::DoesntMatter);
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 1.0);
    }

    #[test]
    fn test_ordinal_similar_uses_distance() {
        let table = table();
        let spec = table.get("political_views").unwrap();
        let a = text("liberal", Preference::Similar);
        let b = text("conservative", Preference::Similar);
        assert!((similarity(spec, Some(&a), Some(&b)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_flexible_wildcard_short_circuits() {
        let table = table();
        let spec = table.get("sleep_schedule").unwrap();
        let a = text("flexible", Preference::Same);
        let b = text("night_owl", Preference::Same);
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 1.0);
    }

    #[test]
    fn test_multi_select_similar_floor() {
        let table = table();
        let spec = table.get("weekend_activities").unwrap();
        let a = QuestionResponse::new(AnswerValue::Set(set(&["hiking", "gaming", "cooking", "reading"])), Preference::Similar);
        let b = QuestionResponse::new(AnswerValue::Set(set(&["hiking", "clubbing", "museums"])), Preference::Similar);
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 0.5);

        let same_a = QuestionResponse { preference: Preference::Same, ..a.clone() };
        let same_b = QuestionResponse { preference: Preference::Same, ..b.clone() };
        assert!((similarity(spec, Some(&same_a), Some(&same_b)) - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_vs_multi_containment() {
        let table = table();
        let spec = table.get("dietary_preference").unwrap();
        let a = text("vegan", Preference::SpecificValues { values: set(&["vegan", "vegetarian"]) });
        let b = text("vegetarian", Preference::SpecificValues { values: set(&["vegan", "vegetarian", "pescatarian"]) });
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 1.0);

        let c = text("omnivore", Preference::DoesntMatter);
        assert_eq!(satisfaction(spec, &a, &c), 0.0);
    }

    #[test]
    fn test_substance_rules() {
        let table = table();
        let spec = table.get("substance_use").unwrap();
        let none = QuestionResponse::new(
            AnswerValue::Substance { substances: BTreeSet::new(), frequency: None },
            Preference::Same,
        );
        let weekly_alcohol = QuestionResponse::new(
            AnswerValue::Substance { substances: set(&["alcohol"]), frequency: Some("weekly".into()) },
            Preference::Same,
        );
        let monthly_both = QuestionResponse::new(
            AnswerValue::Substance { substances: set(&["alcohol", "cannabis"]), frequency: Some("monthly".into()) },
            Preference::Same,
        );
        assert_eq!(similarity(spec, Some(&none), Some(&none.clone())), 1.0);
        assert_eq!(similarity(spec, Some(&none), Some(&weekly_alcohol)), 0.0);

        // overlap 1/2, frequency one step apart on a 3-step span
        let expected = (0.5 + (1.0 - 1.0 / 3.0)) / 2.0;
        assert!((similarity(spec, Some(&weekly_alcohol), Some(&monthly_both)) - expected).abs() < 1e-9);

        let wants_less = QuestionResponse { preference: Preference::Less, ..weekly_alcohol.clone() };
        assert_eq!(satisfaction(spec, &wants_less, &none), 1.0);
    }

    #[test]
    fn test_directional_more_partial_credit() {
        let table = table();
        let spec = table.get("exercise_frequency").unwrap();
        let a = text("often", Preference::More);
        let more = text("daily", Preference::Similar);
        let less = text("rarely", Preference::Similar);
        assert_eq!(satisfaction(spec, &a, &more), 1.0);
        assert_eq!(satisfaction(spec, &a, &less), 0.5);
    }

    #[test]
    fn test_directional_numeric_range() {
        let table = table();
        let spec = table.get("cleanliness").unwrap();
        let a = QuestionResponse::new(AnswerValue::Number(4.0), Preference::SpecificRange { min: Some(3.0), max: None });
        let tidy = QuestionResponse::new(AnswerValue::Number(5.0), Preference::Similar);
        let messy = QuestionResponse::new(AnswerValue::Number(2.0), Preference::Similar);
        assert_eq!(satisfaction(spec, &a, &tidy), 1.0);
        assert_eq!(satisfaction(spec, &a, &messy), 0.0);
    }

    #[test]
    fn test_complement_table() {
        let table = table();
        let spec = table.get("relationship_role").unwrap();
        let leader = text("leader", Preference::Complement);
        let supporter = text("supporter", Preference::Complement);
        let talker = text("talker", Preference::Complement);
        assert_eq!(similarity(spec, Some(&leader), Some(&supporter)), 1.0);
        assert_eq!(similarity(spec, Some(&leader), Some(&talker)), 0.0);
    }

    #[test]
    fn test_love_languages_bidirectional() {
        let table = table();
        let spec = table.get("love_languages").unwrap();
        let a = QuestionResponse::new(
            AnswerValue::LoveLanguages { show: set(&["touch", "words"]), receive: set(&["time", "touch"]) },
            Preference::Same,
        );
        let b = QuestionResponse::new(
            AnswerValue::LoveLanguages { show: set(&["time"]), receive: set(&["words"]) },
            Preference::Same,
        );
        assert_eq!(satisfaction(spec, &a, &b), 0.5);
        assert_eq!(satisfaction(spec, &b, &a), 1.0);
        assert_eq!(similarity(spec, Some(&a), Some(&b)), 0.5);
    }

    #[test]
    fn test_conflict_matrix_lookup() {
        let table = table();
        let spec = table.get("conflict_resolution").unwrap();
        let a = text("talk_it_out", Preference::Similar);
        let b = text("compromise", Preference::Similar);
        assert!((similarity(spec, Some(&a), Some(&b)) - 0.9).abs() < 1e-9);
    }
}
