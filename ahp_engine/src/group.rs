use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;
use crate::hierarchy::GlobalPriorityMap;
use crate::matrix::ComparisonMatrix;

/// The synthesized result of one evaluator, as submitted to the group.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorContribution {
    pub evaluator_id: String,
    pub scores: GlobalPriorityMap,
    /// Only used by the explicit-weight policy.
    pub weight: f64,
    pub include_in_group: bool,
    /// The largest consistency ratio among the matrices of this evaluator.
    pub worst_consistency_ratio: f64,
}

impl EvaluatorContribution {
    pub fn new(evaluator_id: impl Into<String>, scores: GlobalPriorityMap) -> Self {
        EvaluatorContribution {
            evaluator_id: evaluator_id.into(),
            scores,
            weight: 1.0,
            include_in_group: true,
            worst_consistency_ratio: 0.0,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub policy: GroupPolicy,
    pub scores: GlobalPriorityMap,
    /// Normalized weight of every included evaluator.
    pub effective_weights: BTreeMap<String, f64>,
    /// Evaluators left out of the group, in input order.
    pub excluded: Vec<String>,
    /// SHA-256 of the exact bits of the scores and weights. Two runs over the
    /// same inputs produce the same fingerprint.
    pub fingerprint: String,
}

fn raw_weights(
    included: &[&EvaluatorContribution],
    policy: GroupPolicy,
    weighting: &ConsistencyWeighting,
) -> AhpResult<Vec<f64>> {
    match policy {
        GroupPolicy::Equal => Ok(vec![1.0; included.len()]),
        GroupPolicy::ExplicitWeight => {
            for c in included.iter() {
                ensure!(
                    c.weight.is_finite() && c.weight >= 0.0,
                    InvalidInputSnafu {
                        reason: format!(
                            "evaluator {} has an invalid weight {}",
                            c.evaluator_id, c.weight
                        )
                    }
                );
            }
            Ok(included.iter().map(|c| c.weight).collect())
        }
        GroupPolicy::ConsistencyWeighted => {
            ensure!(
                weighting.floor.is_finite() && weighting.floor > 0.0,
                InvalidInputSnafu {
                    reason: format!("the consistency weight floor must be positive: {}", weighting.floor)
                }
            );
            for c in included.iter() {
                ensure!(
                    c.worst_consistency_ratio.is_finite() && c.worst_consistency_ratio >= 0.0,
                    InvalidInputSnafu {
                        reason: format!(
                            "evaluator {} has an invalid consistency ratio {}",
                            c.evaluator_id, c.worst_consistency_ratio
                        )
                    }
                );
            }
            Ok(included
                .iter()
                .map(|c| 1.0 / (c.worst_consistency_ratio + weighting.floor))
                .collect())
        }
    }
}

fn fingerprint(scores: &GlobalPriorityMap, weights: &BTreeMap<String, f64>) -> String {
    let mut buf = String::new();
    for (id, s) in scores.iter() {
        buf.push_str(&format!("s:{}={:016x};", id, s.to_bits()));
    }
    for (id, w) in weights.iter() {
        buf.push_str(&format!("w:{}={:016x};", id, w.to_bits()));
    }
    sha256::digest(buf.as_str())
}

/// Group aggregation with the default consistency weighting.
pub fn aggregate_group(
    contributions: &[EvaluatorContribution],
    policy: GroupPolicy,
) -> AhpResult<GroupResult> {
    aggregate_group_with(contributions, policy, &ConsistencyWeighting::DEFAULT)
}

/// Combines the scores of the included evaluators into one score per
/// alternative, as a weighted arithmetic mean.
///
/// The evaluators are processed in input order, so the result is
/// reproducible bit for bit.
pub fn aggregate_group_with(
    contributions: &[EvaluatorContribution],
    policy: GroupPolicy,
    weighting: &ConsistencyWeighting,
) -> AhpResult<GroupResult> {
    let included: Vec<&EvaluatorContribution> =
        contributions.iter().filter(|c| c.include_in_group).collect();
    let excluded: Vec<String> = contributions
        .iter()
        .filter(|c| !c.include_in_group)
        .map(|c| c.evaluator_id.clone())
        .collect();
    ensure!(!included.is_empty(), EmptyGroupSnafu {});

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for c in included.iter() {
        ensure!(
            seen.insert(c.evaluator_id.as_str()),
            InvalidInputSnafu {
                reason: format!("evaluator {} appears twice", c.evaluator_id)
            }
        );
    }

    let reference: Vec<&String> = included[0].scores.keys().collect();
    for c in included.iter().skip(1) {
        let keys: Vec<&String> = c.scores.keys().collect();
        ensure!(
            keys == reference,
            DimensionMismatchSnafu {
                what: format!("alternatives scored by {}", c.evaluator_id),
                expected: reference.len(),
                actual: keys.len(),
            }
        );
    }

    let raw = raw_weights(&included, policy, weighting)?;
    let total: f64 = raw.iter().sum();
    ensure!(
        total > 0.0 && total.is_finite(),
        InvalidInputSnafu {
            reason: "the evaluator weights sum to zero"
        }
    );
    let normalized: Vec<f64> = raw.iter().map(|w| w / total).collect();

    let mut scores: GlobalPriorityMap = reference.iter().map(|a| ((*a).clone(), 0.0)).collect();
    for (c, w) in included.iter().zip(normalized.iter()) {
        for (alt, s) in c.scores.iter() {
            if let Some(acc) = scores.get_mut(alt) {
                *acc += w * s;
            }
        }
    }
    let effective_weights: BTreeMap<String, f64> = included
        .iter()
        .zip(normalized.iter())
        .map(|(c, w)| (c.evaluator_id.clone(), *w))
        .collect();
    debug!("aggregate_group: effective weights {:?}", effective_weights);
    info!(
        "aggregate_group: policy {:?}, {} included, {} excluded",
        policy,
        included.len(),
        excluded.len()
    );
    let fingerprint = fingerprint(&scores, &effective_weights);
    Ok(GroupResult {
        policy,
        scores,
        effective_weights,
        excluded,
        fingerprint,
    })
}

/// Aggregation of individual judgments: every cell of the group matrix is
/// the weighted geometric mean of the evaluators' cells.
///
/// The geometric mean of reciprocals is the reciprocal of the geometric mean,
/// so the result is again a reciprocal matrix.
pub fn aggregate_judgments(
    matrices: &[ComparisonMatrix],
    weights: &[f64],
) -> AhpResult<ComparisonMatrix> {
    ensure!(!matrices.is_empty(), EmptyGroupSnafu {});
    ensure!(
        weights.len() == matrices.len(),
        DimensionMismatchSnafu {
            what: "evaluator weights",
            expected: matrices.len(),
            actual: weights.len(),
        }
    );
    ensure!(
        weights.iter().all(|w| w.is_finite() && *w >= 0.0),
        InvalidInputSnafu {
            reason: format!("evaluator weights must be non-negative: {:?}", weights)
        }
    );
    let total: f64 = weights.iter().sum();
    ensure!(
        total > 0.0,
        InvalidInputSnafu {
            reason: "the evaluator weights sum to zero"
        }
    );
    let n = matrices[0].size();
    for m in matrices.iter() {
        ensure!(
            m.size() == n,
            DimensionMismatchSnafu {
                what: "evaluator matrix",
                expected: n,
                actual: m.size(),
            }
        );
    }
    let mut res = ComparisonMatrix::identity(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let log_mean: f64 = matrices
                .iter()
                .zip(weights.iter())
                .map(|(m, w)| w * m.get(i, j).ln())
                .sum::<f64>()
                / total;
            res.set_upper(i, j, log_mean.exp());
        }
    }
    debug!("aggregate_judgments: {:?}", res.rows());
    Ok(res)
}
