use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;

use crate::config::*;
use crate::hierarchy::{combine_scores, rank_alternatives, GlobalPriorityMap};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Everything a sensitivity run needs to recompute the synthesis.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    /// Global weights of the leaf criteria. They must sum to 1.
    pub leaf_weights: BTreeMap<String, f64>,
    /// Raw scores of the alternatives under every leaf criterion.
    pub leaf_scores: BTreeMap<String, Vec<f64>>,
    pub alternatives: Vec<String>,
    pub mode: AggregationMode,
}

/// How the weight of the target criterion is moved.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum Perturbation {
    /// Additive changes of the weight: 0.05 is five percentage points more.
    /// The resulting weight is clamped to [0, 1].
    Deltas(Vec<f64>),
    /// `steps` evenly spaced target weights from `from` to `to` (inclusive).
    Sweep { from: f64, to: f64, steps: usize },
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn classify(max_swing: f64, thresholds: &ImpactThresholds) -> Impact {
        if max_swing > thresholds.high {
            Impact::High
        } else if max_swing > thresholds.medium {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityPoint {
    /// Change of the target weight against the baseline, after clamping.
    pub delta: f64,
    pub target_weight: f64,
    pub weights: BTreeMap<String, f64>,
    pub scores: GlobalPriorityMap,
    pub ranks: BTreeMap<String, usize>,
    /// Baseline rank minus new rank: positive means the alternative moved up.
    pub rank_changes: BTreeMap<String, i64>,
    /// Largest absolute score change of any alternative.
    pub max_swing: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub criterion: String,
    /// Set for paired runs: the criterion that gave up the weight.
    pub paired_with: Option<String>,
    pub baseline_weight: f64,
    pub baseline: GlobalPriorityMap,
    pub baseline_ranks: BTreeMap<String, usize>,
    pub points: Vec<SensitivityPoint>,
    pub max_swing: f64,
    pub rank_reversal: bool,
    pub impact: Impact,
}

fn ranks_of(scores: &GlobalPriorityMap) -> BTreeMap<String, usize> {
    rank_alternatives(scores)
        .into_iter()
        .map(|r| (r.alternative_id, r.rank))
        .collect()
}

fn check_input(input: &SensitivityInput, thresholds: &ImpactThresholds) -> AhpResult<()> {
    ensure!(
        input.leaf_weights.len() >= 2,
        InvalidInputSnafu {
            reason: "a sensitivity analysis needs at least two criteria"
        }
    );
    ensure!(
        input.leaf_weights.values().all(|w| w.is_finite() && *w >= 0.0),
        InvalidInputSnafu {
            reason: format!("criterion weights must be non-negative: {:?}", input.leaf_weights)
        }
    );
    let total: f64 = input.leaf_weights.values().sum();
    ensure!(
        (total - 1.0).abs() <= WEIGHT_SUM_TOLERANCE,
        InvalidInputSnafu {
            reason: format!("criterion weights sum to {} instead of 1", total)
        }
    );
    ensure!(
        thresholds.medium <= thresholds.high,
        InvalidInputSnafu {
            reason: format!(
                "the medium impact threshold {} is above the high one {}",
                thresholds.medium, thresholds.high
            )
        }
    );
    Ok(())
}

fn target_weight(input: &SensitivityInput, target: &str) -> AhpResult<f64> {
    input
        .leaf_weights
        .get(target)
        .cloned()
        .context(UnknownElementSnafu { id: target })
}

/// Sets the target weight and rescales the other weights so that the total
/// stays 1. When the others are all zero, they share the remainder equally.
pub fn rescale_weights(
    weights: &BTreeMap<String, f64>,
    target: &str,
    new_weight: f64,
) -> BTreeMap<String, f64> {
    let new_weight = new_weight.clamp(0.0, 1.0);
    let remainder = 1.0 - new_weight;
    let others: f64 = weights
        .iter()
        .filter(|(id, _)| id.as_str() != target)
        .map(|(_, w)| w)
        .sum();
    let count = weights.len().saturating_sub(1).max(1) as f64;
    weights
        .iter()
        .map(|(id, w)| {
            let v = if id.as_str() == target {
                new_weight
            } else if others > 0.0 {
                w * remainder / others
            } else {
                remainder / count
            };
            (id.clone(), v)
        })
        .collect()
}

fn sweep_weights(from: f64, to: f64, steps: usize) -> AhpResult<Vec<f64>> {
    ensure!(
        steps >= 2,
        InvalidInputSnafu {
            reason: format!("a sweep needs at least 2 steps, got {}", steps)
        }
    );
    ensure!(
        (0.0..=1.0).contains(&from) && (0.0..=1.0).contains(&to),
        InvalidInputSnafu {
            reason: format!("sweep bounds {} and {} must be within [0, 1]", from, to)
        }
    );
    let step = (to - from) / (steps - 1) as f64;
    Ok((0..steps)
        .map(|k| if k + 1 == steps { to } else { from + step * k as f64 })
        .collect())
}

fn evaluate_point(
    input: &SensitivityInput,
    baseline: &GlobalPriorityMap,
    baseline_ranks: &BTreeMap<String, usize>,
    delta: f64,
    target_weight: f64,
    weights: BTreeMap<String, f64>,
) -> AhpResult<SensitivityPoint> {
    let scores = combine_scores(&weights, &input.leaf_scores, &input.alternatives, input.mode)?;
    let ranks = ranks_of(&scores);
    let rank_changes: BTreeMap<String, i64> = ranks
        .iter()
        .map(|(id, r)| {
            let base = baseline_ranks.get(id).cloned().unwrap_or(*r);
            (id.clone(), base as i64 - *r as i64)
        })
        .collect();
    let max_swing = scores
        .iter()
        .map(|(id, s)| (s - baseline.get(id).cloned().unwrap_or(0.0)).abs())
        .fold(0.0, f64::max);
    Ok(SensitivityPoint {
        delta,
        target_weight,
        weights,
        scores,
        ranks,
        rank_changes,
        max_swing,
    })
}

fn finish_report(
    criterion: &str,
    paired_with: Option<String>,
    baseline_weight: f64,
    baseline: GlobalPriorityMap,
    baseline_ranks: BTreeMap<String, usize>,
    points: Vec<SensitivityPoint>,
    thresholds: &ImpactThresholds,
) -> SensitivityReport {
    let max_swing = points.iter().map(|p| p.max_swing).fold(0.0, f64::max);
    let rank_reversal = points
        .iter()
        .any(|p| p.rank_changes.values().any(|c| *c != 0));
    let impact = Impact::classify(max_swing, thresholds);
    info!(
        "sensitivity: criterion {} ({} points): max swing {:.4}, impact {:?}, rank reversal {}",
        criterion,
        points.len(),
        max_swing,
        impact,
        rank_reversal
    );
    SensitivityReport {
        criterion: criterion.to_string(),
        paired_with,
        baseline_weight,
        baseline,
        baseline_ranks,
        points,
        max_swing,
        rank_reversal,
        impact,
    }
}

/// Moves the weight of one criterion and recomputes the synthesis at every
/// step, keeping the relative weights of the other criteria.
pub fn run_sensitivity(
    input: &SensitivityInput,
    target: &str,
    perturbation: &Perturbation,
    thresholds: &ImpactThresholds,
) -> AhpResult<SensitivityReport> {
    check_input(input, thresholds)?;
    let base_weight = target_weight(input, target)?;
    let baseline = combine_scores(
        &input.leaf_weights,
        &input.leaf_scores,
        &input.alternatives,
        input.mode,
    )?;
    let baseline_ranks = ranks_of(&baseline);

    let targets: Vec<f64> = match perturbation {
        Perturbation::Deltas(deltas) => {
            ensure!(
                deltas.iter().all(|d| d.is_finite()),
                InvalidInputSnafu {
                    reason: format!("deltas must be numbers: {:?}", deltas)
                }
            );
            deltas
                .iter()
                .map(|d| (base_weight + d).clamp(0.0, 1.0))
                .collect()
        }
        Perturbation::Sweep { from, to, steps } => sweep_weights(*from, *to, *steps)?,
    };

    let mut points = Vec::with_capacity(targets.len());
    for t in targets.into_iter() {
        let weights = rescale_weights(&input.leaf_weights, target, t);
        debug!("run_sensitivity: {} -> {}: {:?}", target, t, weights);
        points.push(evaluate_point(
            input,
            &baseline,
            &baseline_ranks,
            t - base_weight,
            t,
            weights,
        )?);
    }
    Ok(finish_report(
        target,
        None,
        base_weight,
        baseline,
        baseline_ranks,
        points,
        thresholds,
    ))
}

/// Transfers weight from `decrease` to `increase`, leaving the other
/// criteria untouched. A transfer larger than what the donor holds (or, for
/// negative deltas, than what the receiver holds) is clamped.
pub fn run_paired_sensitivity(
    input: &SensitivityInput,
    increase: &str,
    decrease: &str,
    deltas: &[f64],
    thresholds: &ImpactThresholds,
) -> AhpResult<SensitivityReport> {
    check_input(input, thresholds)?;
    ensure!(
        increase != decrease,
        InvalidInputSnafu {
            reason: format!("cannot move weight from {} to itself", increase)
        }
    );
    let w_inc = target_weight(input, increase)?;
    let w_dec = target_weight(input, decrease)?;
    ensure!(
        deltas.iter().all(|d| d.is_finite()),
        InvalidInputSnafu {
            reason: format!("deltas must be numbers: {:?}", deltas)
        }
    );
    let baseline = combine_scores(
        &input.leaf_weights,
        &input.leaf_scores,
        &input.alternatives,
        input.mode,
    )?;
    let baseline_ranks = ranks_of(&baseline);

    let mut points = Vec::with_capacity(deltas.len());
    for d in deltas.iter() {
        let moved = if *d >= 0.0 { d.min(w_dec) } else { d.max(-w_inc) };
        let mut weights = input.leaf_weights.clone();
        weights.insert(increase.to_string(), w_inc + moved);
        weights.insert(decrease.to_string(), w_dec - moved);
        points.push(evaluate_point(
            input,
            &baseline,
            &baseline_ranks,
            moved,
            w_inc + moved,
            weights,
        )?);
    }
    Ok(finish_report(
        increase,
        Some(decrease.to_string()),
        w_inc,
        baseline,
        baseline_ranks,
        points,
        thresholds,
    ))
}

/// Runs the single-criterion analysis for every leaf criterion, most
/// influential first.
pub fn analyze_all_criteria(
    input: &SensitivityInput,
    deltas: &[f64],
    thresholds: &ImpactThresholds,
) -> AhpResult<Vec<SensitivityReport>> {
    let perturbation = Perturbation::Deltas(deltas.to_vec());
    let mut reports = Vec::with_capacity(input.leaf_weights.len());
    for criterion in input.leaf_weights.keys() {
        reports.push(run_sensitivity(input, criterion, &perturbation, thresholds)?);
    }
    reports.sort_by(|a, b| b.max_swing.total_cmp(&a.max_swing));
    Ok(reports)
}
