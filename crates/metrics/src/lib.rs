//! Ranking-quality metrics for search relevance evaluation.
//!
//! Pure, deterministic functions over a ranked document-id list and a
//! document→grade judgment map. Documents absent from the judgments are
//! treated as grade 0, never as an error, so partially-judged result lists
//! score without special casing.
//!
//! Metric names are stable strings (`dcg@10`, `ndcg@10`, ...) used verbatim
//! as result-map keys and as display keys in imported data.

use std::collections::{BTreeMap, HashMap};

/// Stable key for DCG at depth `k`.
pub fn dcg_key(k: usize) -> String {
    format!("dcg@{k}")
}

/// Stable key for NDCG at depth `k`.
pub fn ndcg_key(k: usize) -> String {
    format!("ndcg@{k}")
}

/// Stable key for precision at depth `k`.
pub fn precision_key(k: usize) -> String {
    format!("precision@{k}")
}

/// Stable key for mean average precision at depth `k`.
pub fn map_key(k: usize) -> String {
    format!("map@{k}")
}

/// Computes the full metric set for one ranked result list.
///
/// `k` must be positive. Returns `{dcg@k, ndcg@k, precision@k, map@k}` keyed
/// by the stable metric names.
pub fn evaluate(
    ranked_doc_ids: &[String],
    judgments: &HashMap<String, f64>,
    k: usize,
) -> BTreeMap<String, f64> {
    debug_assert!(k > 0, "metric depth must be positive");

    let grades: Vec<f64> = ranked_doc_ids
        .iter()
        .take(k)
        .map(|id| judgments.get(id).copied().unwrap_or(0.0))
        .collect();

    let mut metrics = BTreeMap::new();
    metrics.insert(dcg_key(k), dcg_at_k(&grades, k));
    metrics.insert(ndcg_key(k), ndcg_at_k(&grades, judgments, k));
    metrics.insert(precision_key(k), precision_at_k(&grades, k));
    metrics.insert(map_key(k), average_precision_at_k(&grades, judgments, k));
    metrics
}

/// Discounted Cumulative Gain over the top `k` positions.
///
/// Gain `2^grade - 1`, discount `log2(i + 2)` for 0-based rank `i`.
pub fn dcg_at_k(grades: &[f64], k: usize) -> f64 {
    grades
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &grade)| (grade.exp2() - 1.0) / (i as f64 + 2.0).log2())
        .sum()
}

/// Normalized DCG: DCG divided by the DCG of the ideal ordering of all
/// judged documents. Defined as 0.0 when the ideal DCG is 0 so unjudged or
/// all-zero queries never divide by zero.
pub fn ndcg_at_k(grades: &[f64], judgments: &HashMap<String, f64>, k: usize) -> f64 {
    let ideal = ideal_dcg_at_k(judgments, k);
    if ideal == 0.0 {
        return 0.0;
    }
    dcg_at_k(grades, k) / ideal
}

/// DCG of the best possible top-`k` ordering of the judged documents.
fn ideal_dcg_at_k(judgments: &HashMap<String, f64>, k: usize) -> f64 {
    let mut ideal_grades: Vec<f64> = judgments.values().copied().collect();
    ideal_grades.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    ideal_grades.truncate(k);
    dcg_at_k(&ideal_grades, k)
}

/// Fraction of the top `k` positions holding a relevant (grade > 0)
/// document. The denominator is `k`, so short result lists are penalized.
pub fn precision_at_k(grades: &[f64], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let relevant = grades.iter().take(k).filter(|&&g| g > 0.0).count();
    relevant as f64 / k as f64
}

/// Average precision over the top `k` positions, normalized by the number of
/// relevant judged documents (capped at `k`). 0.0 when nothing is relevant.
pub fn average_precision_at_k(
    grades: &[f64],
    judgments: &HashMap<String, f64>,
    k: usize,
) -> f64 {
    let total_relevant = judgments.values().filter(|&&g| g > 0.0).count();
    let denominator = total_relevant.min(k);
    if denominator == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (i, &grade) in grades.iter().take(k).enumerate() {
        if grade > 0.0 {
            hits += 1;
            precision_sum += hits as f64 / (i as f64 + 1.0);
        }
    }
    precision_sum / denominator as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EPSILON: f64 = 1e-9;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn judgments(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(d, g)| (d.to_string(), *g)).collect()
    }

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() < EPSILON, "{a} != {b}");
    }

    #[test]
    fn dcg_matches_hand_computed_value() {
        // grades [3, 2, 0]: (2^3-1)/log2(2) + (2^2-1)/log2(3)
        let dcg = dcg_at_k(&[3.0, 2.0, 0.0], 10);
        approx_eq(dcg, 7.0 + 3.0 / 3.0_f64.log2());
    }

    #[test]
    fn evaluate_returns_all_metrics_under_stable_names() {
        let ranked = ids(&["d1", "d2", "d3"]);
        let judged = judgments(&[("d1", 3.0), ("d2", 2.0)]);
        let metrics = evaluate(&ranked, &judged, 10);

        assert_eq!(
            metrics.keys().cloned().collect::<Vec<_>>(),
            vec!["dcg@10", "map@10", "ndcg@10", "precision@10"]
        );
        approx_eq(metrics["ndcg@10"], 1.0);
        approx_eq(metrics["precision@10"], 0.2);
    }

    #[test]
    fn unjudged_documents_score_as_grade_zero() {
        let ranked = ids(&["d1", "unknown", "d2"]);
        let judged = judgments(&[("d1", 2.0), ("d2", 1.0)]);
        let with_absent = evaluate(&ranked, &judged, 10);

        let explicit = {
            let mut j = judged.clone();
            j.insert("unknown".to_string(), 0.0);
            evaluate(&ranked, &j, 10)
        };

        approx_eq(with_absent["ndcg@10"], explicit["ndcg@10"]);
        approx_eq(with_absent["dcg@10"], explicit["dcg@10"]);
        approx_eq(with_absent["map@10"], explicit["map@10"]);
    }

    #[test]
    fn ndcg_is_zero_when_ideal_dcg_is_zero() {
        let ranked = ids(&["d1", "d2"]);
        approx_eq(ndcg_at_k(&[0.0, 0.0], &HashMap::new(), 10), 0.0);

        let all_zero = judgments(&[("d1", 0.0), ("d2", 0.0)]);
        let metrics = evaluate(&ranked, &all_zero, 10);
        approx_eq(metrics["ndcg@10"], 0.0);
    }

    #[test]
    fn perfect_ranking_has_ndcg_one() {
        let ranked = ids(&["best", "good", "ok"]);
        let judged = judgments(&[("best", 3.0), ("good", 2.0), ("ok", 1.0)]);
        let metrics = evaluate(&ranked, &judged, 3);
        approx_eq(metrics["ndcg@3"], 1.0);
    }

    #[test]
    fn reversed_ranking_has_ndcg_below_one() {
        let ranked = ids(&["ok", "good", "best"]);
        let judged = judgments(&[("best", 3.0), ("good", 2.0), ("ok", 1.0)]);
        let metrics = evaluate(&ranked, &judged, 3);
        assert!(metrics["ndcg@3"] < 1.0);
        assert!(metrics["ndcg@3"] > 0.0);
    }

    #[test]
    fn precision_penalizes_short_result_lists() {
        let ranked = ids(&["d1"]);
        let judged = judgments(&[("d1", 1.0)]);
        let metrics = evaluate(&ranked, &judged, 10);
        approx_eq(metrics["precision@10"], 0.1);
    }

    #[test]
    fn average_precision_rewards_early_hits() {
        let judged = judgments(&[("d1", 1.0), ("d2", 1.0)]);
        // hits at ranks 1 and 2: (1/1 + 2/2) / 2 = 1.0
        approx_eq(average_precision_at_k(&[1.0, 1.0], &judged, 10), 1.0);
        // hits at ranks 2 and 4: (1/2 + 2/4) / 2 = 0.5
        approx_eq(
            average_precision_at_k(&[0.0, 1.0, 0.0, 1.0], &judged, 10),
            0.5
        );
    }

    #[test]
    fn empty_result_list_scores_zero_everywhere() {
        let judged = judgments(&[("d1", 2.0)]);
        let metrics = evaluate(&[], &judged, 10);
        approx_eq(metrics["dcg@10"], 0.0);
        approx_eq(metrics["ndcg@10"], 0.0);
        approx_eq(metrics["precision@10"], 0.0);
        approx_eq(metrics["map@10"], 0.0);
    }
}
