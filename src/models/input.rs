use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate record as it arrives from decrypted questionnaire storage,
/// before normalization. Responses are left as raw JSON because several
/// historical encodings are still in circulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(alias = "userId", alias = "user_id")]
    pub id: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(rename = "interestedInGenders", alias = "interested_in_genders", default)]
    pub interested_in_genders: Option<Vec<String>>,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(rename = "okMatchingDifferentCampus", alias = "ok_matching_different_campus", default)]
    pub ok_matching_different_campus: bool,
    #[serde(default)]
    pub responses: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_both_key_styles() {
        let camel: RawCandidate = serde_json::from_str(
            r#"{"userId": "u1", "interestedInGenders": ["women"], "okMatchingDifferentCampus": true}"#,
        )
        .unwrap();
        let snake: RawCandidate = serde_json::from_str(
            r#"{"id": "u1", "interested_in_genders": ["women"], "ok_matching_different_campus": true}"#,
        )
        .unwrap();
        assert_eq!(camel.id, snake.id);
        assert_eq!(camel.interested_in_genders, snake.interested_in_genders);
        assert!(camel.ok_matching_different_campus && snake.ok_matching_different_campus);
        assert!(camel.responses.is_empty());
    }
}
