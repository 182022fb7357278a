use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;
use crate::core::similarity::similarity;
use crate::models::{
    Candidate, PairDiagnostics, PairScore, Preference, QuestionId, QuestionKind, QuestionSpec, QuestionTable,
    Section,
};
use crate::services::text_similarity::TextSimilaritySource;

/// One question's contribution to one direction of a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question: QuestionId,
    pub section: Section,
    /// Symmetric similarity in [0, 1] before weighting.
    pub raw: f64,
    /// Raw similarity times the combined importance weight.
    pub weighted: f64,
    /// Normalized score in [0, 1] after the directional adjustment.
    pub score: f64,
    /// Weight of this question inside its section mean.
    pub section_weight: f64,
}

/// Symmetric raw similarity for every question at least one side answered.
///
/// Free-text questions are scored by `text`; when it has nothing for the
/// pair the question is left out entirely.
fn raw_similarities<'t>(
    a: &Candidate,
    b: &Candidate,
    table: &'t QuestionTable,
    text: &dyn TextSimilaritySource,
) -> Vec<(&'t QuestionSpec, f64)> {
    table
        .scored()
        .filter_map(|spec| {
            let ra = a.response(&spec.id);
            let rb = b.response(&spec.id);
            if ra.is_none() && rb.is_none() {
                return None;
            }
            let raw = match spec.kind {
                QuestionKind::FreeText => match (ra, rb) {
                    (Some(_), Some(_)) => text.score(&spec.id, &a.id, &b.id)?.clamp(0.0, 1.0),
                    _ => 0.0,
                },
                _ => similarity(spec, ra, rb),
            };
            Some((spec, raw))
        })
        .collect()
}

/// Whether `peer` sits on the side of `me` that `me` asked for.
///
/// `None` when the question is not directional, `me` did not ask for
/// more or less, or either position is unknown.
fn directional_condition(spec: &QuestionSpec, me: &Candidate, peer: &Candidate) -> Option<bool> {
    let QuestionKind::Directional(scale) = &spec.kind else {
        return None;
    };
    let mine = me.response(&spec.id)?;
    let theirs = peer.response(&spec.id)?;
    if spec.is_wildcard(&mine.answer) || spec.is_wildcard(&theirs.answer) {
        return None;
    }
    let my_pos = scale.position(&mine.answer)?;
    let their_pos = scale.position(&theirs.answer)?;
    match mine.preference {
        Preference::More => Some(their_pos >= my_pos),
        Preference::Less => Some(their_pos <= my_pos),
        _ => None,
    }
}

/// Per-question scores for how well `peer` satisfies `me`.
fn direction_breakdown(
    me: &Candidate,
    peer: &Candidate,
    raws: &[(&QuestionSpec, f64)],
    config: &MatchingConfig,
) -> Vec<QuestionScore> {
    let scale = &config.importance;

    raws.iter()
        .map(|(spec, raw)| {
            let w_me = me.importance_weight(&spec.id, scale);
            let w_peer = peer.importance_weight(&spec.id, scale);
            let w_q = config.question_weighting.combine(w_me, w_peer);

            // Zero importance still leaves a normalized score to report
            let base = if w_q > 0.0 { w_q } else { 1.0 };
            let weighted = raw * base;
            let adjusted = match directional_condition(spec, me, peer) {
                Some(true) => (weighted * config.directional.satisfied).min(base),
                Some(false) => weighted * config.directional.unsatisfied,
                None => weighted,
            };

            QuestionScore {
                question: spec.id.clone(),
                section: spec.section,
                raw: *raw,
                weighted: raw * w_q,
                score: (adjusted / base).clamp(0.0, 1.0),
                section_weight: config.section_weighting.combine(w_me, w_peer),
            }
        })
        .collect()
}

/// Importance-weighted mean of one section in [0, 1].
///
/// Falls back to the plain mean when every weight is zero; an empty
/// section scores 0.
pub fn section_score(scores: &[QuestionScore], section: Section) -> f64 {
    let members: Vec<&QuestionScore> = scores.iter().filter(|s| s.section == section).collect();
    if members.is_empty() {
        return 0.0;
    }

    let total_weight: f64 = members.iter().map(|s| s.section_weight).sum();
    if total_weight > 0.0 {
        members.iter().map(|s| s.score * s.section_weight).sum::<f64>() / total_weight
    } else {
        members.iter().map(|s| s.score).sum::<f64>() / members.len() as f64
    }
}

/// Directional total in [0, 100] from the section means.
pub fn directional_total(scores: &[QuestionScore], config: &MatchingConfig) -> f64 {
    let lifestyle = section_score(scores, Section::Lifestyle);
    let personality = section_score(scores, Section::Personality);
    let total = (lifestyle * config.section_weights.lifestyle
        + personality * config.section_weights.personality)
        * 100.0;
    total.clamp(0.0, 100.0)
}

/// Symmetric combination biased toward the weaker direction.
#[inline]
pub fn mutuality_score(a_to_b: f64, b_to_a: f64, alpha: f64) -> f64 {
    let low = a_to_b.min(b_to_a);
    let mean = (a_to_b + b_to_a) / 2.0;
    alpha * low + (1.0 - alpha) * mean
}

/// Share of the stronger direction lost to the mutuality formula.
#[inline]
pub fn mutuality_penalty(a_to_b: f64, b_to_a: f64, pair_score: f64) -> f64 {
    let high = a_to_b.max(b_to_a);
    if high <= 0.0 {
        0.0
    } else {
        (high - pair_score) / high
    }
}

/// Score both directions of a pair that passed the hard filters.
pub fn score_pair(
    a: &Candidate,
    b: &Candidate,
    table: &QuestionTable,
    config: &MatchingConfig,
    text: &dyn TextSimilaritySource,
) -> PairScore {
    let raws = raw_similarities(a, b, table, text);
    let a_view = direction_breakdown(a, b, &raws, config);
    let b_view = direction_breakdown(b, a, &raws, config);

    let score_a_to_b = directional_total(&a_view, config);
    let score_b_to_a = directional_total(&b_view, config);
    let pair_score = mutuality_score(score_a_to_b, score_b_to_a, config.mutuality_alpha).clamp(0.0, 100.0);

    let mut low_scoring_questions = Vec::new();
    let mut asymmetric_questions = Vec::new();
    for (ab, ba) in a_view.iter().zip(&b_view) {
        if ab.score < config.low_score_threshold || ba.score < config.low_score_threshold {
            low_scoring_questions.push(ab.question.clone());
        }
        if (ab.score - ba.score).abs() > config.asymmetry_threshold {
            asymmetric_questions.push(ab.question.clone());
        }
    }

    PairScore {
        a_id: a.id.clone(),
        b_id: b.id.clone(),
        score_a_to_b,
        score_b_to_a,
        pair_score,
        diagnostics: PairDiagnostics {
            mutuality_penalty: mutuality_penalty(score_a_to_b, score_b_to_a, pair_score),
            low_scoring_questions,
            asymmetric_questions,
            questions_scored: raws.len(),
        },
    }
}
