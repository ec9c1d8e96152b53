use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::*;
use crate::matrix::{nearest_scale_value, ComparisonMatrix};
use crate::priority::{estimate_priority, PriorityVector};

// Saaty's random consistency indices for n = 1..15.
// Values past 10 come from the extended simulations and are less settled.
const RANDOM_INDEX: [f64; 15] = [
    0.0, 0.0, 0.52, 0.89, 1.11, 1.25, 1.35, 1.40, 1.45, 1.49, 1.51, 1.48, 1.56, 1.57, 1.59,
];

// Below this log error, a cell is considered consistent with the priorities.
const CORRECTION_EPSILON: f64 = 1e-9;

/// The random index for a matrix of `n` elements. Sizes above the table reuse its last value.
pub fn random_index(n: usize) -> f64 {
    match n {
        0 => 0.0,
        n if n <= RANDOM_INDEX.len() => RANDOM_INDEX[n - 1],
        _ => RANDOM_INDEX[RANDOM_INDEX.len() - 1],
    }
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsistencyResult {
    pub ci: f64,
    pub cr: f64,
    pub max_eigenvalue: f64,
    pub is_acceptable: bool,
}

/// A recommended change to one judgment, for a human to accept or ignore.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrectionSuggestion {
    pub i: usize,
    pub j: usize,
    pub current_value: f64,
    /// The ratio `w[i] / w[j]` implied by the current priorities.
    pub consistent_value: f64,
    pub recommended_value: f64,
    pub log_error: f64,
}

/// Everything the engine derives from one comparison matrix.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MatrixEvaluation {
    pub priorities: PriorityVector,
    pub consistency: ConsistencyResult,
    /// Only filled in when the matrix is not acceptable.
    pub suggestions: Vec<CorrectionSuggestion>,
}

fn check_dimensions(matrix: &ComparisonMatrix, vector: &PriorityVector) -> AhpResult<()> {
    ensure!(
        vector.len() == matrix.size(),
        DimensionMismatchSnafu {
            what: "priority vector",
            expected: matrix.size(),
            actual: vector.len(),
        }
    );
    ensure!(
        vector.weights().iter().all(|w| w.is_finite() && *w > 0.0),
        InvalidMatrixSnafu {
            reason: format!("priorities must be positive: {:?}", vector)
        }
    );
    Ok(())
}

/// Consistency check with the conventional 0.10 threshold.
pub fn check_consistency(
    matrix: &ComparisonMatrix,
    vector: &PriorityVector,
) -> AhpResult<ConsistencyResult> {
    check_consistency_with(matrix, vector, DEFAULT_CONSISTENCY_THRESHOLD)
}

/// Computes the consistency index and ratio of a matrix given its priorities.
///
/// The principal eigenvalue is approximated by the mean of `(M w)[i] / w[i]`.
/// Rounding can make it fall a hair below `n` on consistent matrices, so the
/// index is clamped at 0.
pub fn check_consistency_with(
    matrix: &ComparisonMatrix,
    vector: &PriorityVector,
    threshold: f64,
) -> AhpResult<ConsistencyResult> {
    check_dimensions(matrix, vector)?;
    let n = matrix.size();
    let w = vector.weights();
    let product = matrix.multiply(w)?;
    let max_eigenvalue =
        product.iter().zip(w.iter()).map(|(mw, wi)| mw / wi).sum::<f64>() / n as f64;
    let ci = if n > 1 {
        ((max_eigenvalue - n as f64) / (n as f64 - 1.0)).max(0.0)
    } else {
        0.0
    };
    let ri = random_index(n);
    let cr = if ri > 0.0 { ci / ri } else { 0.0 };
    let res = ConsistencyResult {
        ci,
        cr,
        max_eigenvalue,
        is_acceptable: cr <= threshold,
    };
    debug!("check_consistency: n={} {:?}", n, res);
    Ok(res)
}

/// Ranks the judgments by how far they are from the ratio implied by the
/// priorities, and recommends the closest scale value for the `top_k` worst.
///
/// Cells that already agree with the priorities are never suggested.
pub fn suggest_corrections(
    matrix: &ComparisonMatrix,
    vector: &PriorityVector,
    top_k: usize,
) -> AhpResult<Vec<CorrectionSuggestion>> {
    check_dimensions(matrix, vector)?;
    let n = matrix.size();
    let w = vector.weights();
    let mut cells: Vec<CorrectionSuggestion> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let current_value = matrix.get(i, j);
            let consistent_value = w[i] / w[j];
            let log_error = (current_value.ln() - consistent_value.ln()).abs();
            if log_error <= CORRECTION_EPSILON {
                continue;
            }
            cells.push(CorrectionSuggestion {
                i,
                j,
                current_value,
                consistent_value,
                recommended_value: nearest_scale_value(consistent_value),
                log_error,
            });
        }
    }
    // Stable sort: equal errors keep the row order.
    cells.sort_by(|a, b| b.log_error.total_cmp(&a.log_error));
    cells.truncate(top_k);
    debug!("suggest_corrections: {:?}", cells);
    Ok(cells)
}

/// Derives the priorities of a matrix, checks them, and attaches up to
/// `top_k` suggestions when the matrix fails the threshold.
pub fn evaluate_matrix(
    matrix: &ComparisonMatrix,
    rules: &EngineRules,
    top_k: usize,
) -> AhpResult<MatrixEvaluation> {
    let priorities = estimate_priority(matrix, rules.priority_method, &rules.power_iteration)?;
    let consistency = check_consistency_with(matrix, &priorities, rules.consistency_threshold)?;
    let suggestions = if consistency.is_acceptable {
        Vec::new()
    } else {
        warn!(
            "evaluate_matrix: consistency ratio {:.4} is above the threshold {}",
            consistency.cr, rules.consistency_threshold
        );
        suggest_corrections(matrix, &priorities, top_k)?
    };
    Ok(MatrixEvaluation {
        priorities,
        consistency,
        suggestions,
    })
}
