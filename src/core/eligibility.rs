use std::collections::BTreeMap;

use crate::config::MatchingConfig;
use crate::models::{EligibilityStats, EligiblePair, PairScore};

/// Which eligibility conditions a pair missed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateCheck {
    /// Pair score below the absolute floor.
    pub absolute: bool,
    /// A's view of B below β times A's best score.
    pub relative_a: bool,
    /// B's view of A below β times B's best score.
    pub relative_b: bool,
}

impl GateCheck {
    pub fn passed(&self) -> bool {
        !(self.absolute || self.relative_a || self.relative_b)
    }
}

/// Result of gating every scored pair
#[derive(Debug, Clone, Default)]
pub struct EligibilityOutcome {
    pub eligible: Vec<EligiblePair>,
    pub best_scores: BTreeMap<String, f64>,
    pub stats: EligibilityStats,
}

/// Each candidate's ceiling: the best pair score across its scored pairs.
pub fn best_scores(pairs: &[PairScore]) -> BTreeMap<String, f64> {
    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    for pair in pairs {
        for id in [&pair.a_id, &pair.b_id] {
            let entry = best.entry(id.clone()).or_insert(f64::NEG_INFINITY);
            if pair.pair_score > *entry {
                *entry = pair.pair_score;
            }
        }
    }
    best
}

/// A direction passes when it reaches β of its own ceiling. A ceiling of
/// zero or less never passes.
#[inline]
fn relative_ok(directional: f64, best: Option<f64>, beta: f64) -> bool {
    match best {
        Some(best) if best > 0.0 => directional >= beta * best,
        _ => false,
    }
}

pub fn check_pair(pair: &PairScore, best: &BTreeMap<String, f64>, config: &MatchingConfig) -> GateCheck {
    GateCheck {
        absolute: pair.pair_score < config.min_pair_score,
        relative_a: !relative_ok(pair.score_a_to_b, best.get(&pair.a_id).copied(), config.relative_beta),
        relative_b: !relative_ok(pair.score_b_to_a, best.get(&pair.b_id).copied(), config.relative_beta),
    }
}

/// Gate all scored pairs.
///
/// Runs after every pair has been scored, since each decision depends on
/// both candidates' best scores. `candidate_ids` must be in run order; the
/// perfectionist and isolated lists follow it.
pub fn apply_eligibility(
    candidate_ids: &[String],
    scored: &[PairScore],
    config: &MatchingConfig,
) -> EligibilityOutcome {
    let best = best_scores(scored);
    let mut stats = EligibilityStats::default();
    let mut eligible = Vec::new();
    let mut has_eligible: BTreeMap<&str, bool> = BTreeMap::new();

    for pair in scored {
        let check = check_pair(pair, &best, config);
        if check.absolute {
            stats.failed_absolute += 1;
        }
        if check.relative_a {
            stats.failed_relative_a += 1;
        }
        if check.relative_b {
            stats.failed_relative_b += 1;
        }

        let passed = check.passed();
        for id in [pair.a_id.as_str(), pair.b_id.as_str()] {
            let flag = has_eligible.entry(id).or_insert(false);
            *flag |= passed;
        }

        if passed {
            eligible.push(EligiblePair { score: pair.clone() });
        } else {
            tracing::debug!(
                a = %pair.a_id,
                b = %pair.b_id,
                pair_score = pair.pair_score,
                ?check,
                "pair failed eligibility"
            );
        }
    }

    for id in candidate_ids {
        match has_eligible.get(id.as_str()) {
            None => stats.isolated.push(id.clone()),
            Some(false) => stats.perfectionists.push(id.clone()),
            Some(true) => {}
        }
    }
    stats.eligible_pairs = eligible.len();

    EligibilityOutcome {
        eligible,
        best_scores: best,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PairDiagnostics;

    fn pair(a: &str, b: &str, ab: f64, ba: f64, score: f64) -> PairScore {
        PairScore {
            a_id: a.to_string(),
            b_id: b.to_string(),
            score_a_to_b: ab,
            score_b_to_a: ba,
            pair_score: score,
            diagnostics: PairDiagnostics::default(),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_relative_threshold_rejects_settling() {
        let config = MatchingConfig::default();
        let scored = vec![
            pair("a", "b", 40.0, 40.0, 40.0),
            pair("a", "c", 90.0, 90.0, 90.0),
        ];
        let outcome = apply_eligibility(&ids(&["a", "b", "c"]), &scored, &config);

        assert_eq!(outcome.eligible.len(), 1);
        assert_eq!(outcome.eligible[0].score.b_id, "c");
        assert_eq!(outcome.stats.failed_relative_a, 1);
        assert_eq!(outcome.stats.perfectionists, vec!["b".to_string()]);
    }

    #[test]
    fn test_relative_only_failure() {
        let config = MatchingConfig {
            min_pair_score: 0.0,
            ..MatchingConfig::default()
        };
        let best: BTreeMap<String, f64> = [("a".to_string(), 90.0), ("b".to_string(), 50.0)].into();
        let check = check_pair(&pair("a", "b", 50.0, 50.0, 50.0), &best, &config);
        assert!(!check.absolute);
        assert!(check.relative_a);
        assert!(!check.relative_b);
        assert!(!check.passed());
    }

    #[test]
    fn test_zero_ceiling_never_passes() {
        let config = MatchingConfig {
            min_pair_score: 0.0,
            ..MatchingConfig::default()
        };
        let scored = vec![pair("a", "b", 0.0, 0.0, 0.0)];
        let outcome = apply_eligibility(&ids(&["a", "b", "c"]), &scored, &config);
        assert!(outcome.eligible.is_empty());
        assert_eq!(outcome.stats.perfectionists, ids(&["a", "b"]));
        assert_eq!(outcome.stats.isolated, ids(&["c"]));
    }

    #[test]
    fn test_raising_thresholds_never_adds_pairs() {
        let scored = vec![
            pair("a", "b", 70.0, 60.0, 63.5),
            pair("a", "c", 50.0, 80.0, 60.5),
            pair("b", "c", 45.0, 44.0, 44.4),
            pair("c", "d", 95.0, 90.0, 91.75),
        ];
        let candidates = ids(&["a", "b", "c", "d"]);

        let mut previous = usize::MAX;
        for t_min in [0.0, 40.0, 45.0, 60.0, 90.0] {
            let config = MatchingConfig {
                min_pair_score: t_min,
                ..MatchingConfig::default()
            };
            let count = apply_eligibility(&candidates, &scored, &config).eligible.len();
            assert!(count <= previous);
            previous = count;
        }

        let mut previous = usize::MAX;
        for beta in [0.0, 0.3, 0.6, 0.9, 1.0] {
            let config = MatchingConfig {
                relative_beta: beta,
                ..MatchingConfig::default()
            };
            let count = apply_eligibility(&candidates, &scored, &config).eligible.len();
            assert!(count <= previous);
            previous = count;
        }
    }
}
