use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::MatchOutcome;

/// One partner offered to a human reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPartner {
    #[serde(rename = "partnerId")]
    pub partner_id: String,
    #[serde(rename = "pairScore")]
    pub pair_score: f64,
    /// How well the partner suits the reviewed candidate.
    #[serde(rename = "scoreForCandidate")]
    pub score_for_candidate: f64,
    /// How well the reviewed candidate suits the partner.
    #[serde(rename = "scoreForPartner")]
    pub score_for_partner: f64,
    #[serde(rename = "partnerMatchedWith")]
    pub partner_matched_with: Option<String>,
}

/// Top eligible partners for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewShortlist {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "matchedWith")]
    pub matched_with: Option<String>,
    pub partners: Vec<ReviewPartner>,
}

fn matched_index(outcome: &MatchOutcome) -> BTreeMap<&str, &str> {
    outcome
        .matches
        .iter()
        .flat_map(|m| [(m.a_id.as_str(), m.b_id.as_str()), (m.b_id.as_str(), m.a_id.as_str())])
        .collect()
}

fn shortlist_with(outcome: &MatchOutcome, matched: &BTreeMap<&str, &str>, user_id: &str, k: usize) -> ReviewShortlist {
    let mut partners: Vec<ReviewPartner> = outcome
        .eligible
        .iter()
        .filter_map(|pair| {
            let score = &pair.score;
            let partner = score.partner_of(user_id)?;
            Some(ReviewPartner {
                partner_id: partner.to_string(),
                pair_score: score.pair_score,
                score_for_candidate: score.score_from(user_id)?,
                score_for_partner: score.score_from(partner)?,
                partner_matched_with: matched.get(partner).map(|m| m.to_string()),
            })
        })
        .collect();

    partners.sort_by(|a, b| {
        b.pair_score
            .total_cmp(&a.pair_score)
            .then_with(|| a.partner_id.cmp(&b.partner_id))
    });
    partners.truncate(k);

    ReviewShortlist {
        user_id: user_id.to_string(),
        matched_with: matched.get(user_id).map(|m| m.to_string()),
        partners,
    }
}

/// Top-K eligible partners for `user_id`, by pair score.
pub fn build_shortlist(outcome: &MatchOutcome, user_id: &str, k: usize) -> ReviewShortlist {
    shortlist_with(outcome, &matched_index(outcome), user_id, k)
}

/// Shortlists for every unmatched candidate that has eligible partners.
pub fn shortlists_for_unmatched(outcome: &MatchOutcome, k: usize) -> Vec<ReviewShortlist> {
    let matched = matched_index(outcome);
    outcome
        .unmatched
        .iter()
        .map(|record| shortlist_with(outcome, &matched, &record.user_id, k))
        .filter(|list| !list.partners.is_empty())
        .collect()
}
