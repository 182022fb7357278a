use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::config::MatchingConfig;
use crate::core::{
    blossom::max_weight_matching,
    eligibility::{apply_eligibility, check_pair, EligibilityOutcome},
    filters::{check_hard_filters, HardFilterResult},
    normalize::Normalizer,
    scoring::score_pair,
};
use crate::error::{ConfigurationError, GraphInconsistencyError};
use crate::models::{
    Candidate, EligiblePair, HardFilterStats, MatchOutcome, MatchPair, NotMatchedBecause, PairScore,
    PartnerExplanation, PipelineDiagnostics, QuestionTable, RawCandidate, ScoreStats, UnmatchedDetail,
    UnmatchedReason, UnmatchedRecord,
};
use crate::services::text_similarity::TextSimilaritySource;

/// Stage 1 and 2 result for one unordered pair
#[derive(Debug, Clone)]
enum PairEvaluation {
    Filtered(HardFilterResult),
    Scored(PairScore),
}

/// Index of pair (i, j), i < j, in the row-major upper-triangle order.
#[inline]
fn pair_index(n: usize, i: usize, j: usize) -> usize {
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

/// Main matching orchestrator - runs one batch end to end
///
/// # Pipeline Stages
/// 1. Hard filters (gender, campus, age, dealbreakers)
/// 2. Per-question similarity, importance, directional and section scoring
/// 3. Mutual pair score
/// 4. Eligibility gate (after every pair is scored)
/// 5. Global maximum-weight matching
#[derive(Debug, Clone)]
pub struct Matcher {
    config: MatchingConfig,
    table: QuestionTable,
}

impl Matcher {
    pub fn new(config: MatchingConfig, table: QuestionTable) -> Result<Self, ConfigurationError> {
        Ok(Self {
            config: config.validated()?,
            table,
        })
    }

    pub fn with_default_config() -> Result<Self, ConfigurationError> {
        Self::new(MatchingConfig::default(), QuestionTable::builtin()?)
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn table(&self) -> &QuestionTable {
        &self.table
    }

    pub fn normalizer(&self) -> Normalizer<'_> {
        Normalizer::new(&self.table, &self.config.importance)
    }

    /// Normalize raw questionnaire data, then run the pipeline.
    pub fn run_raw(
        &self,
        raws: &[RawCandidate],
        text: &dyn TextSimilaritySource,
    ) -> Result<MatchOutcome, GraphInconsistencyError> {
        let started = Instant::now();
        let (candidates, errors) = self.normalizer().normalize_all(raws);
        if !errors.is_empty() {
            tracing::warn!(count = errors.len(), "Dropped responses with unrecognized shapes");
        }

        let mut outcome = self.run(&candidates, text)?;
        outcome.diagnostics.dropped_responses = errors.len();
        outcome.diagnostics.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    /// Run the full pipeline over one pool of candidates.
    ///
    /// Deterministic for a fixed input and configuration: candidates are
    /// ordered by id before any work and every output list follows that order.
    pub fn run(
        &self,
        candidates: &[Candidate],
        text: &dyn TextSimilaritySource,
    ) -> Result<MatchOutcome, GraphInconsistencyError> {
        let started = Instant::now();

        let mut pool: Vec<&Candidate> = candidates.iter().collect();
        pool.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(dup) = pool.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(GraphInconsistencyError::DuplicateCandidate(dup[0].id.clone()));
        }
        let n = pool.len();
        let ids: Vec<String> = pool.iter().map(|c| c.id.clone()).collect();

        // Stages 1-3: independent per pair
        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| ((i + 1)..n).map(move |j| (i, j))).collect();
        let evaluations: Vec<PairEvaluation> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let (a, b) = (pool[i], pool[j]);
                let filter = check_hard_filters(a, b, &self.table);
                if filter.passed {
                    PairEvaluation::Scored(score_pair(a, b, &self.table, &self.config, text))
                } else {
                    PairEvaluation::Filtered(filter)
                }
            })
            .collect();

        let hard_filter = hard_filter_stats(&evaluations);
        tracing::info!(
            pairs_considered = hard_filter.pairs_considered,
            pairs_filtered = hard_filter.pairs_filtered,
            "Hard filter stage complete"
        );

        let scored: Vec<PairScore> = evaluations
            .iter()
            .filter_map(|e| match e {
                PairEvaluation::Scored(score) => Some(score.clone()),
                PairEvaluation::Filtered(_) => None,
            })
            .collect();
        let scoring = ScoreStats::from_scores(scored.iter().map(|p| p.pair_score));
        tracing::info!(
            pair_count = scoring.pair_count,
            mean_score = scoring.mean_score,
            "Scoring stage complete"
        );

        // Stage 4: needs every best score, so it waits for all pairs
        let gate = apply_eligibility(&ids, &scored, &self.config);
        tracing::info!(
            eligible_pairs = gate.stats.eligible_pairs,
            failed_absolute = gate.stats.failed_absolute,
            perfectionists = gate.stats.perfectionists.len(),
            isolated = gate.stats.isolated.len(),
            "Eligibility stage complete"
        );

        // Stage 5: one global matching over the eligible graph
        let index: BTreeMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        let mut edge_lookup: BTreeMap<(usize, usize), &EligiblePair> = BTreeMap::new();
        let mut edges = Vec::with_capacity(gate.eligible.len());
        for pair in &gate.eligible {
            let (Some(&i), Some(&j)) = (index.get(pair.score.a_id.as_str()), index.get(pair.score.b_id.as_str()))
            else {
                continue;
            };
            let weight = (pair.score.pair_score * f64::from(self.config.weight_scale)).round() as i64;
            edges.push((i, j, weight.max(0)));
            edge_lookup.insert((i.min(j), i.max(j)), pair);
        }
        let mates = max_weight_matching(n, &edges);

        let mut matches = Vec::new();
        for (i, mate) in mates.iter().enumerate() {
            let Some(j) = *mate else { continue };
            if j < i {
                continue;
            }
            let pair = edge_lookup.get(&(i, j)).ok_or_else(|| GraphInconsistencyError::UnknownEdge {
                a: ids[i].clone(),
                b: ids.get(j).cloned().unwrap_or_default(),
            })?;
            matches.push(MatchPair {
                a_id: ids[i].clone(),
                b_id: ids[j].clone(),
                score: pair.score.clone(),
            });
        }
        validate_matches(&matches)?;

        let matched_with: BTreeMap<&str, &str> = matches
            .iter()
            .flat_map(|m| [(m.a_id.as_str(), m.b_id.as_str()), (m.b_id.as_str(), m.a_id.as_str())])
            .collect();

        let context = ExplainContext {
            n,
            pool: &pool,
            evaluations: &evaluations,
            gate: &gate,
            matched_with: &matched_with,
            config: &self.config,
        };
        let mut unmatched = Vec::new();
        let mut unmatched_details = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if matched_with.contains_key(id.as_str()) {
                continue;
            }
            unmatched.push(context.classify(id));
            unmatched_details.push(UnmatchedDetail {
                user_id: id.clone(),
                top_partners: context.top_partners(i),
            });
        }
        tracing::info!(
            match_count = matches.len(),
            unmatched_count = unmatched.len(),
            "Matching stage complete"
        );

        let diagnostics = PipelineDiagnostics {
            candidate_count: n,
            dropped_responses: 0,
            hard_filter,
            scoring,
            eligibility: gate.stats.clone(),
            match_count: matches.len(),
            unmatched_count: unmatched.len(),
            unmatched_details,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        Ok(MatchOutcome {
            matches,
            unmatched,
            eligible: gate.eligible,
            diagnostics,
        })
    }
}

fn hard_filter_stats(evaluations: &[PairEvaluation]) -> HardFilterStats {
    let mut stats = HardFilterStats {
        pairs_considered: evaluations.len(),
        ..HardFilterStats::default()
    };
    for evaluation in evaluations {
        if let PairEvaluation::Filtered(result) = evaluation {
            stats.pairs_filtered += 1;
            if let Some(reason) = result.reason {
                *stats.by_reason.entry(reason.key().to_string()).or_insert(0) += 1;
            }
        }
    }
    stats
}

/// Reject a matching that pairs anyone twice, pairs anyone with themself,
/// or carries an out-of-range score.
pub fn validate_matches(matches: &[MatchPair]) -> Result<(), GraphInconsistencyError> {
    let mut seen = BTreeSet::new();
    for m in matches {
        if m.a_id == m.b_id {
            return Err(GraphInconsistencyError::SelfPair(m.a_id.clone()));
        }
        let score = m.score.pair_score;
        if !(0.0..=100.0).contains(&score) {
            return Err(GraphInconsistencyError::ScoreOutOfRange {
                a: m.a_id.clone(),
                b: m.b_id.clone(),
                score,
            });
        }
        for id in [&m.a_id, &m.b_id] {
            if !seen.insert(id.as_str()) {
                return Err(GraphInconsistencyError::DuplicateCandidate(id.clone()));
            }
        }
    }
    Ok(())
}

/// Everything needed to explain why a candidate ended up alone
struct ExplainContext<'r> {
    n: usize,
    pool: &'r [&'r Candidate],
    evaluations: &'r [PairEvaluation],
    gate: &'r EligibilityOutcome,
    matched_with: &'r BTreeMap<&'r str, &'r str>,
    config: &'r MatchingConfig,
}

impl<'r> ExplainContext<'r> {
    fn evaluation(&self, i: usize, j: usize) -> &PairEvaluation {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        &self.evaluations[pair_index(self.n, lo, hi)]
    }

    /// Highest-scoring partner; the first in id order wins ties.
    fn best_of<'p, I>(pairs: I, id: &str) -> Option<(&'p str, f64)>
    where
        I: Iterator<Item = &'p PairScore>,
    {
        let mut best: Option<(&str, f64)> = None;
        for pair in pairs {
            let Some(partner) = pair.partner_of(id) else { continue };
            match best {
                Some((_, score)) if pair.pair_score <= score => {}
                _ => best = Some((partner, pair.pair_score)),
            }
        }
        best
    }

    fn classify(&self, id: &str) -> UnmatchedRecord {
        let best_eligible = Self::best_of(
            self.gate.eligible.iter().map(|e| &e.score).filter(|p| p.involves(id)),
            id,
        );

        let reason = match best_eligible {
            None => UnmatchedReason::NoEligiblePairs {
                all_failed_hard_filters: self.gate.stats.isolated.iter().any(|i| i == id),
            },
            Some((partner, _)) if self.matched_with.contains_key(partner) => UnmatchedReason::Outcompeted,
            Some(_) => UnmatchedReason::OddParity,
        };

        let best_scored = Self::best_of(
            self.evaluations.iter().filter_map(|e| match e {
                PairEvaluation::Scored(p) if p.involves(id) => Some(p),
                _ => None,
            }),
            id,
        );

        UnmatchedRecord {
            user_id: id.to_string(),
            reason,
            best_possible_score: best_scored.map(|(_, score)| score),
            best_possible_match_id: best_scored.map(|(partner, _)| partner.to_string()),
        }
    }

    /// Up to top-K partners with the reason each was not the match:
    /// scored partners by pair score, then filtered ones in id order.
    fn top_partners(&self, i: usize) -> Vec<PartnerExplanation> {
        let me = self.pool[i].id.as_str();
        let mut scored: Vec<(usize, &PairScore)> = Vec::new();
        let mut filtered: Vec<(usize, &HardFilterResult)> = Vec::new();

        for j in (0..self.n).filter(|&j| j != i) {
            match self.evaluation(i, j) {
                PairEvaluation::Scored(pair) => scored.push((j, pair)),
                PairEvaluation::Filtered(result) => filtered.push((j, result)),
            }
        }
        // Stable sort keeps id order among equal scores
        scored.sort_by(|a, b| b.1.pair_score.total_cmp(&a.1.pair_score));

        let scored = scored.into_iter().map(|(j, pair)| {
            let partner = self.pool[j].id.as_str();
            let check = check_pair(pair, &self.gate.best_scores, self.config);
            let reason = if !check.passed() {
                let (relative_self, relative_partner) = if pair.a_id == me {
                    (check.relative_a, check.relative_b)
                } else {
                    (check.relative_b, check.relative_a)
                };
                NotMatchedBecause::FailedEligibility {
                    absolute: check.absolute,
                    relative_self,
                    relative_partner,
                }
            } else {
                match self.matched_with.get(partner) {
                    Some(other) => NotMatchedBecause::Outcompeted {
                        partner_matched_with: other.to_string(),
                    },
                    None => NotMatchedBecause::PartnerUnmatched,
                }
            };
            PartnerExplanation {
                partner_id: partner.to_string(),
                pair_score: Some(pair.pair_score),
                reason,
            }
        });

        let filtered = filtered.into_iter().filter_map(|(j, result)| {
            result.reason.map(|failure| PartnerExplanation {
                partner_id: self.pool[j].id.clone(),
                pair_score: None,
                reason: NotMatchedBecause::FailedHardFilter { failure },
            })
        });

        scored.chain(filtered).take(self.config.top_k).collect()
    }
}
