//! Response normalizer: coerces raw questionnaire JSON into canonical
//! `QuestionResponse` values, trying each known historical encoding in turn.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ImportanceScale;
use crate::error::DataShapeError;
use crate::models::domain::PREFER_NOT_TO_ANSWER;
use crate::models::question::{AGE, GENDER_IDENTITY, GENDER_PREFERENCE};
use crate::models::{
    AnswerValue, Candidate, Gender, GenderTarget, Importance, Preference, QuestionKind,
    QuestionResponse, QuestionSpec, QuestionTable, RawCandidate,
};

/// Lowercase, trim, and fold hyphens and spaces into underscores.
pub fn canonical_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

pub fn parse_gender(raw: &str) -> Gender {
    match canonical_token(raw).as_str() {
        "man" | "men" | "male" => Gender::Man,
        "woman" | "women" | "female" => Gender::Woman,
        "non_binary" | "nonbinary" | "non_binaries" | "enby" => Gender::NonBinary,
        "prefer_not_to_say" | "prefer_not_to_answer" | "" => Gender::PreferNotToSay,
        other => Gender::Other(other.to_string()),
    }
}

pub fn parse_gender_target(raw: &str) -> GenderTarget {
    match canonical_token(raw).as_str() {
        "anyone" | "everyone" | "any" | "all" => GenderTarget::Anyone,
        _ => GenderTarget::Specific(parse_gender(raw)),
    }
}

/// Turns raw candidates into canonical candidates for one run
pub struct Normalizer<'a> {
    table: &'a QuestionTable,
    scale: &'a ImportanceScale,
}

impl<'a> Normalizer<'a> {
    pub fn new(table: &'a QuestionTable, scale: &'a ImportanceScale) -> Self {
        Self { table, scale }
    }

    /// Normalize every candidate, collecting recoverable shape errors.
    pub fn normalize_all(&self, raws: &[RawCandidate]) -> (Vec<Candidate>, Vec<DataShapeError>) {
        let mut errors = Vec::new();
        let candidates = raws
            .iter()
            .map(|raw| {
                let (candidate, mut errs) = self.normalize(raw);
                errors.append(&mut errs);
                candidate
            })
            .collect();
        (candidates, errors)
    }

    pub fn normalize(&self, raw: &RawCandidate) -> (Candidate, Vec<DataShapeError>) {
        let mut errors = Vec::new();
        let mut responses = BTreeMap::new();

        for (question, value) in &raw.responses {
            let shape_error = |reason: String| DataShapeError {
                candidate: raw.id.clone(),
                question: question.clone(),
                reason,
            };

            let Some(spec) = self.table.get(question) else {
                let err = shape_error("question is not in the question table".to_string());
                tracing::warn!("{}", err);
                errors.push(err);
                continue;
            };

            let decoded = if question == AGE {
                decode_age(value)
            } else {
                self.decode_response(spec, value)
            };

            match decoded {
                Ok(response) => {
                    responses.insert(question.clone(), response);
                }
                Err(reason) => {
                    let err = shape_error(reason);
                    tracing::warn!("{}, treating as unanswered", err);
                    errors.push(err);
                }
            }
        }

        let gender = raw
            .gender
            .as_deref()
            .map(parse_gender)
            .or_else(|| {
                responses
                    .get(GENDER_IDENTITY)
                    .and_then(|r| r.answer.as_text())
                    .map(parse_gender)
            })
            .unwrap_or(Gender::PreferNotToSay);

        let interested_in: BTreeSet<GenderTarget> = match &raw.interested_in_genders {
            Some(list) => list.iter().map(|g| parse_gender_target(g)).collect(),
            None => responses
                .get(GENDER_PREFERENCE)
                .map(|r| r.answer.to_set().iter().map(|g| parse_gender_target(g)).collect())
                .unwrap_or_default(),
        };

        if interested_in.is_empty() {
            let err = DataShapeError {
                candidate: raw.id.clone(),
                question: GENDER_PREFERENCE.to_string(),
                reason: "no gender preference given; candidate cannot pass the gender filter"
                    .to_string(),
            };
            tracing::warn!("{}", err);
            errors.push(err);
        }

        let candidate = Candidate {
            id: raw.id.clone(),
            gender,
            interested_in,
            campus: raw.campus.as_deref().map(canonical_token).unwrap_or_default(),
            ok_matching_different_campus: raw.ok_matching_different_campus,
            responses,
        };

        (candidate, errors)
    }

    fn decode_response(&self, spec: &QuestionSpec, value: &Value) -> Result<QuestionResponse, String> {
        let (answer, envelope) = split_envelope(value);

        let answer = decode_answer(&spec.kind, answer)?;
        let preference = match envelope {
            Some(obj) if doesnt_matter_flag(obj) => Preference::DoesntMatter,
            Some(obj) => decode_preference(obj.get("preference"), &spec.kind)?,
            None => default_preference(&spec.kind),
        };
        let importance = match envelope.and_then(|obj| obj.get("importance")) {
            None | Some(Value::Null) => Importance::default(),
            Some(raw) => decode_importance(raw, self.scale)?,
        };
        let is_dealbreaker = envelope
            .and_then(|obj| {
                obj.get("isDealbreaker")
                    .or_else(|| obj.get("is_dealbreaker"))
                    .or_else(|| obj.get("dealbreaker"))
            })
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(QuestionResponse {
            answer,
            preference,
            importance,
            is_dealbreaker,
        })
    }
}

/// Separate the answer from its surrounding envelope. Canonical records
/// carry `answer`, legacy ones `value`; anything else is a bare answer.
fn split_envelope(value: &Value) -> (&Value, Option<&Map<String, Value>>) {
    if let Value::Object(obj) = value {
        if let Some(answer) = obj.get("answer") {
            return (answer, Some(obj));
        }
        if let Some(answer) = obj.get("value") {
            return (answer, Some(obj));
        }
    }
    (value, None)
}

fn doesnt_matter_flag(obj: &Map<String, Value>) -> bool {
    ["doesntMatter", "doesnt_matter", "doesNotMatter"]
        .iter()
        .any(|key| obj.get(*key).and_then(Value::as_bool).unwrap_or(false))
}

fn token_set(value: &Value) -> Result<BTreeSet<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(canonical_token(s)),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(format!("unexpected set member {other}")),
            })
            .collect(),
        Value::String(s) if s.contains(',') => Ok(s
            .split(',')
            .map(canonical_token)
            .filter(|t| !t.is_empty())
            .collect()),
        Value::String(s) => Ok(BTreeSet::from([canonical_token(s)])),
        other => Err(format!("expected a list, got {other}")),
    }
}

fn text_token(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(canonical_token(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "yes" } else { "no" }.to_string()),
        other => Err(format!("expected a single value, got {other}")),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_answer(kind: &QuestionKind, value: &Value) -> Result<AnswerValue, String> {
    if value.is_null() {
        return Err("answer is null".to_string());
    }

    match kind {
        QuestionKind::MultiSelect => token_set(value).map(AnswerValue::Set),
        QuestionKind::SingleVsMulti | QuestionKind::Different { .. } => match value {
            Value::Array(_) => token_set(value).map(AnswerValue::Set),
            _ => text_token(value).map(AnswerValue::Text),
        },
        QuestionKind::Directional(scale) | QuestionKind::Ordinal(scale) if scale.is_numeric() => {
            match number(value) {
                Some(n) => Ok(AnswerValue::Number(n)),
                // Wildcards like "flexible" are still allowed on numeric scales
                None => text_token(value).map(AnswerValue::Text),
            }
        }
        QuestionKind::Substance(_) => decode_substance(value),
        QuestionKind::LoveLanguages => {
            let obj = value
                .as_object()
                .ok_or_else(|| format!("expected {{show, receive}}, got {value}"))?;
            let show = obj.get("show").map(token_set).transpose()?.unwrap_or_default();
            let receive = obj.get("receive").map(token_set).transpose()?.unwrap_or_default();
            if show.is_empty() && receive.is_empty() {
                return Err("love languages answer is empty".to_string());
            }
            Ok(AnswerValue::LoveLanguages { show, receive })
        }
        QuestionKind::FreeText => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(AnswerValue::Text(s.trim().to_string())),
            other => Err(format!("expected free text, got {other}")),
        },
        QuestionKind::HardFilter => match value {
            Value::Array(_) => token_set(value).map(AnswerValue::Set),
            _ => text_token(value).map(AnswerValue::Text),
        },
        _ => text_token(value).map(AnswerValue::Text),
    }
}

fn decode_substance(value: &Value) -> Result<AnswerValue, String> {
    let none = || AnswerValue::Substance {
        substances: BTreeSet::new(),
        frequency: None,
    };

    if token_set(value).is_ok_and(|set| set.len() == 1 && set.contains(PREFER_NOT_TO_ANSWER)) {
        return Ok(AnswerValue::Text(PREFER_NOT_TO_ANSWER.to_string()));
    }

    match value {
        Value::String(s) if canonical_token(s) == crate::models::domain::NO_SUBSTANCE => Ok(none()),
        Value::String(_) | Value::Array(_) => {
            let substances = strip_none(token_set(value)?);
            Ok(AnswerValue::Substance {
                substances,
                frequency: None,
            })
        }
        Value::Object(obj) => {
            let substances = obj
                .get("substance")
                .or_else(|| obj.get("substances"))
                .filter(|v| !v.is_null())
                .map(token_set)
                .transpose()?
                .map(strip_none)
                .unwrap_or_default();
            let frequency = obj
                .get("frequency")
                .filter(|v| !v.is_null())
                .map(text_token)
                .transpose()?;
            if substances.is_empty() {
                return Ok(none());
            }
            Ok(AnswerValue::Substance {
                substances,
                frequency,
            })
        }
        other => Err(format!("expected a substance record, got {other}")),
    }
}

fn strip_none(mut set: BTreeSet<String>) -> BTreeSet<String> {
    set.remove(crate::models::domain::NO_SUBSTANCE);
    set
}

fn default_preference(kind: &QuestionKind) -> Preference {
    match kind {
        QuestionKind::Ordinal(_)
        | QuestionKind::Directional(_)
        | QuestionKind::MultiSelect
        | QuestionKind::ConflictMatrix(_) => Preference::Similar,
        QuestionKind::Different { .. } => Preference::Different,
        _ => Preference::Same,
    }
}

fn preference_keyword(token: &str) -> Option<Preference> {
    let preference = match token {
        "same" => Preference::Same,
        "similar" => Preference::Similar,
        "different" => Preference::Different,
        "more" => Preference::More,
        "less" => Preference::Less,
        "complement" | "opposite" => Preference::Complement,
        "doesnt_matter" | "doesntmatter" | "does_not_matter" | "no_preference" | "any" => {
            Preference::DoesntMatter
        }
        _ => return None,
    };
    Some(preference)
}

/// "21-28" style range strings.
fn parse_range_string(raw: &str) -> Option<Preference> {
    let (lo, hi) = raw.split_once('-')?;
    let min: f64 = lo.trim().parse().ok()?;
    let max: f64 = hi.trim().parse().ok()?;
    Some(Preference::SpecificRange {
        min: Some(min),
        max: Some(max),
    })
}

fn range_from_object(obj: &Map<String, Value>) -> Option<Preference> {
    let min_key = ["min", "minAge", "min_age"].into_iter().find(|k| obj.contains_key(*k));
    let max_key = ["max", "maxAge", "max_age"].into_iter().find(|k| obj.contains_key(*k));
    if min_key.is_none() && max_key.is_none() {
        return None;
    }
    Some(Preference::SpecificRange {
        min: min_key.and_then(|k| obj.get(k)).and_then(number),
        max: max_key.and_then(|k| obj.get(k)).and_then(number),
    })
}

fn decode_preference(value: Option<&Value>, kind: &QuestionKind) -> Result<Preference, String> {
    let Some(value) = value else {
        return Ok(default_preference(kind));
    };

    match value {
        Value::Null => Ok(default_preference(kind)),
        // Anything that is not a keyword or a range names the one accepted value
        Value::String(s) => match parse_range_string(s).or_else(|| preference_keyword(&canonical_token(s))) {
            Some(preference) => Ok(preference),
            None => token_set(value).and_then(|values| {
                if values.is_empty() {
                    Err(format!("unknown preference '{s}'"))
                } else {
                    Ok(Preference::SpecificValues { values })
                }
            }),
        },
        Value::Array(items) if items.len() == 2 && items.iter().all(|v| v.is_number() || v.is_null()) => {
            Ok(Preference::SpecificRange {
                min: number(&items[0]),
                max: number(&items[1]),
            })
        }
        Value::Array(_) => token_set(value).map(|values| Preference::SpecificValues { values }),
        Value::Object(obj) => {
            let tag = obj
                .get("kind")
                .or_else(|| obj.get("type"))
                .and_then(Value::as_str)
                .map(canonical_token);
            match tag.as_deref() {
                Some("specific_values" | "values") => {
                    let values = obj
                        .get("values")
                        .map(token_set)
                        .transpose()?
                        .ok_or("specific_values preference without values")?;
                    Ok(Preference::SpecificValues { values })
                }
                Some("specific_range" | "range") => {
                    range_from_object(obj).ok_or_else(|| "range preference without bounds".to_string())
                }
                Some(token) => preference_keyword(token).ok_or_else(|| format!("unknown preference '{token}'")),
                None => range_from_object(obj)
                    .map(Ok)
                    .or_else(|| {
                        obj.get("values")
                            .map(|v| token_set(v).map(|values| Preference::SpecificValues { values }))
                    })
                    .unwrap_or_else(|| Err(format!("unrecognized preference object {value}"))),
            }
        }
        other => Err(format!("unrecognized preference {other}")),
    }
}

fn decode_importance(value: &Value, scale: &ImportanceScale) -> Result<Importance, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|w| Importance::from_weight(w, scale))
            .ok_or_else(|| format!("importance {n} is not a number")),
        Value::String(s) => match canonical_token(s).as_str() {
            "not_important" | "not" | "none" | "unimportant" => Ok(Importance::NotImportant),
            "somewhat" | "somewhat_important" => Ok(Importance::Somewhat),
            "important" => Ok(Importance::Important),
            "very_important" | "very" => Ok(Importance::VeryImportant),
            other => other
                .parse::<f64>()
                .map(|w| Importance::from_weight(w, scale))
                .map_err(|_| format!("unknown importance '{s}'")),
        },
        other => Err(format!("unrecognized importance {other}")),
    }
}

/// Age accepts three historical encodings:
/// - flat: `{answer: 24, minAge: 21, maxAge: 28}`
/// - nested: `{answer: {age: 24, range: {min: 21, max: 28}}}`
/// - combined: `{answer: {age: 24, minAge: 21, maxAge: null}}`
///
/// plus the canonical `{answer: 24, preference: {min, max}}` and a bare number.
fn decode_age(value: &Value) -> Result<QuestionResponse, String> {
    let (answer, envelope) = split_envelope(value);

    let (age, inner_range) = match answer {
        Value::Object(obj) => {
            let age = obj
                .get("age")
                .or_else(|| obj.get("value"))
                .and_then(number)
                .ok_or_else(|| format!("age record without an age: {answer}"))?;
            let range = obj
                .get("range")
                .and_then(Value::as_object)
                .and_then(range_from_object)
                .or_else(|| range_from_object(obj));
            (age, range)
        }
        other => (number(other).ok_or_else(|| format!("age is not a number: {other}"))?, None),
    };

    let preference = inner_range
        .or_else(|| {
            let obj = envelope?;
            let from_preference = match obj.get("preference") {
                Some(Value::Object(pref)) => range_from_object(pref),
                Some(Value::Array(items)) if items.len() == 2 => Some(Preference::SpecificRange {
                    min: number(&items[0]),
                    max: number(&items[1]),
                }),
                Some(Value::String(s)) => parse_range_string(s),
                _ => None,
            };
            from_preference.or_else(|| range_from_object(obj))
        })
        .unwrap_or(Preference::DoesntMatter);

    Ok(QuestionResponse::new(AnswerValue::Number(age), preference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(responses: Value) -> RawCandidate {
        RawCandidate {
            id: "u1".to_string(),
            gender: Some("Women".to_string()),
            interested_in_genders: Some(vec!["men".to_string()]),
            campus: Some("North Campus".to_string()),
            ok_matching_different_campus: false,
            responses: serde_json::from_value(responses).unwrap(),
        }
    }

    fn normalize(responses: Value) -> (Candidate, Vec<DataShapeError>) {
        let table = QuestionTable::builtin().unwrap();
        let scale = ImportanceScale::default();
        Normalizer::new(&table, &scale).normalize(&raw(responses))
    }

    #[test]
    fn test_canonical_token_folds_variants() {
        assert_eq!(canonical_token(" Very-Important "), "very_important");
        assert_eq!(canonical_token("night owl"), "night_owl");
    }

    #[test]
    fn test_gender_plural_and_wildcard() {
        let (candidate, _) = normalize(json!({}));
        assert_eq!(candidate.gender, Gender::Woman);
        assert!(candidate.interested_in.contains(&GenderTarget::Specific(Gender::Man)));
        assert_eq!(candidate.campus, "north_campus");
        assert_eq!(parse_gender_target("Everyone"), GenderTarget::Anyone);
    }

    #[test]
    fn test_age_encodings_agree() {
        let encodings = [
            json!({"answer": 24, "minAge": 21, "maxAge": 28}),
            json!({"answer": {"age": 24, "range": {"min": 21, "max": 28}}}),
            json!({"answer": {"age": 24, "minAge": 21, "maxAge": 28}}),
            json!({"answer": 24, "preference": {"min": 21, "max": 28}}),
        ];
        for encoding in encodings {
            let (candidate, errors) = normalize(json!({ "age": encoding }));
            assert!(errors.is_empty(), "{errors:?}");
            let age = candidate.response(AGE).unwrap();
            assert_eq!(age.answer, AnswerValue::Number(24.0));
            assert_eq!(
                age.preference,
                Preference::SpecificRange { min: Some(21.0), max: Some(28.0) }
            );
        }
    }

    #[test]
    fn test_age_null_bound_is_open() {
        let (candidate, _) = normalize(json!({"age": {"answer": {"age": 30, "minAge": null, "maxAge": 35}}}));
        assert_eq!(
            candidate.response(AGE).unwrap().preference,
            Preference::SpecificRange { min: None, max: Some(35.0) }
        );
    }

    #[test]
    fn test_canonical_response_decodes() {
        let (candidate, errors) = normalize(json!({
            "exercise_frequency": {
                "answer": "Often",
                "preference": "more",
                "importance": "very-important",
                "isDealbreaker": true
            }
        }));
        assert!(errors.is_empty());
        let response = candidate.response("exercise_frequency").unwrap();
        assert_eq!(response.answer, AnswerValue::Text("often".into()));
        assert_eq!(response.preference, Preference::More);
        assert_eq!(response.importance, Importance::VeryImportant);
        assert!(response.is_dealbreaker);
    }

    #[test]
    fn test_legacy_value_key_and_bare_answers() {
        let (candidate, errors) = normalize(json!({
            "religion": {"value": "Buddhist", "importance": 3},
            "weekend_activities": "hiking, board games",
            "cleanliness": "4",
        }));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            candidate.response("religion").unwrap().importance,
            Importance::VeryImportant
        );
        assert_eq!(
            candidate.response("weekend_activities").unwrap().answer,
            AnswerValue::Set(BTreeSet::from(["board_games".to_string(), "hiking".to_string()]))
        );
        assert_eq!(
            candidate.response("cleanliness").unwrap().answer,
            AnswerValue::Number(4.0)
        );
    }

    #[test]
    fn test_substance_shapes() {
        let (candidate, _) = normalize(json!({
            "substance_use": {
                "answer": {"substance": ["Alcohol", "cannabis"], "frequency": "weekly"},
                "preference": ["none"],
                "isDealbreaker": true
            }
        }));
        let response = candidate.response("substance_use").unwrap();
        assert_eq!(
            response.answer,
            AnswerValue::Substance {
                substances: BTreeSet::from(["alcohol".to_string(), "cannabis".to_string()]),
                frequency: Some("weekly".to_string()),
            }
        );
        assert_eq!(
            response.preference,
            Preference::SpecificValues { values: BTreeSet::from(["none".to_string()]) }
        );

        let (candidate, _) = normalize(json!({"substance_use": "None"}));
        assert_eq!(
            candidate.response("substance_use").unwrap().answer,
            AnswerValue::Substance { substances: BTreeSet::new(), frequency: None }
        );
    }

    #[test]
    fn test_scalar_preference_names_accepted_value() {
        let (candidate, errors) = normalize(json!({
            "substance_use": {"answer": "none", "preference": "none", "isDealbreaker": true},
            "religion": {"answer": "catholic", "preference": "Catholic"},
        }));
        assert!(errors.is_empty(), "{errors:?}");
        let substance = candidate.response("substance_use").unwrap();
        assert!(substance.is_dealbreaker);
        assert_eq!(
            substance.preference,
            Preference::SpecificValues { values: BTreeSet::from(["none".to_string()]) }
        );
        assert_eq!(
            candidate.response("religion").unwrap().preference,
            Preference::SpecificValues { values: BTreeSet::from(["catholic".to_string()]) }
        );
    }

    #[test]
    fn test_substance_decline_stays_a_decline() {
        for encoding in [json!("Prefer not to answer"), json!({"answer": ["prefer_not_to_answer"]})] {
            let (candidate, errors) = normalize(json!({ "substance_use": encoding }));
            assert!(errors.is_empty());
            assert!(candidate.response("substance_use").unwrap().answer.is_prefer_not_to_answer());
        }
    }

    #[test]
    fn test_age_keyword_preference_keeps_flat_range() {
        let (candidate, errors) = normalize(json!({
            "age": {"answer": 24, "preference": "same", "minAge": 21, "maxAge": 28}
        }));
        assert!(errors.is_empty());
        assert_eq!(
            candidate.response(AGE).unwrap().preference,
            Preference::SpecificRange { min: Some(21.0), max: Some(28.0) }
        );
    }

    #[test]
    fn test_doesnt_matter_flag() {
        let (candidate, _) = normalize(json!({
            "religion": {"answer": "catholic", "preference": "same", "doesntMatter": true}
        }));
        assert!(candidate.response("religion").unwrap().preference.is_doesnt_matter());
    }

    #[test]
    fn test_unknown_shape_is_dropped() {
        let (candidate, errors) = normalize(json!({
            "religion": {"answer": "catholic", "preference": true},
            "love_languages": "words",
            "not_a_question": 1,
        }));
        assert!(candidate.response("religion").is_none());
        assert!(candidate.response("love_languages").is_none());
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_gender_from_responses_when_top_level_missing() {
        let table = QuestionTable::builtin().unwrap();
        let scale = ImportanceScale::default();
        let mut raw = raw(json!({
            "gender_identity": "non-binary",
            "gender_preference": ["anyone"],
        }));
        raw.gender = None;
        raw.interested_in_genders = None;
        let (candidate, errors) = Normalizer::new(&table, &scale).normalize(&raw);
        assert!(errors.is_empty());
        assert_eq!(candidate.gender, Gender::NonBinary);
        assert!(candidate.accepts_anyone());
    }
}
