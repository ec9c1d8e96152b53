use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::*;
use crate::matrix::ComparisonMatrix;

/// Relative weights of the elements compared in one matrix, in matrix row
/// order. The entries are non-negative and sum to 1.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityVector(Vec<f64>);

impl PriorityVector {
    /// Normalizes arbitrary non-negative weights into a priority vector.
    pub fn from_weights(weights: &[f64]) -> AhpResult<PriorityVector> {
        ensure!(
            !weights.is_empty(),
            InvalidInputSnafu {
                reason: "no weights"
            }
        );
        ensure!(
            weights.iter().all(|w| w.is_finite() && *w >= 0.0),
            InvalidInputSnafu {
                reason: format!("weights must be non-negative: {:?}", weights)
            }
        );
        let total: f64 = weights.iter().sum();
        ensure!(
            total > 0.0,
            InvalidInputSnafu {
                reason: "weights sum to zero"
            }
        );
        Ok(PriorityVector(weights.iter().map(|w| w / total).collect()))
    }

    pub fn weights(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.0.get(idx).cloned()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Result of the power iteration.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EigenEstimate {
    pub vector: PriorityVector,
    pub eigenvalue: f64,
    pub iterations: u32,
    pub converged: bool,
}

fn check_entries(matrix: &ComparisonMatrix) -> AhpResult<()> {
    let n = matrix.size();
    ensure!(
        n > 0,
        InvalidMatrixSnafu {
            reason: "the matrix is empty"
        }
    );
    for i in 0..n {
        for (j, v) in matrix.row(i).iter().enumerate() {
            ensure!(
                v.is_finite() && *v > 0.0,
                InvalidMatrixSnafu {
                    reason: format!("entry ({}, {}) is not positive: {}", i, j, v)
                }
            );
        }
    }
    Ok(())
}

/// Geometric-mean estimate of the priorities.
///
/// Each row contributes the n-th root of the product of its entries. The
/// product is computed as a sum of logarithms to stay away from overflow on
/// large matrices.
pub fn compute_priority(matrix: &ComparisonMatrix) -> AhpResult<PriorityVector> {
    check_entries(matrix)?;
    let n = matrix.size() as f64;
    let means: Vec<f64> = (0..matrix.size())
        .map(|i| (matrix.row(i).iter().map(|v| v.ln()).sum::<f64>() / n).exp())
        .collect();
    let res = PriorityVector::from_weights(&means)?;
    debug!("compute_priority: {:?}", res);
    Ok(res)
}

/// Principal eigenvector by power iteration.
///
/// Stops when the L1 distance between two successive vectors falls below the
/// tolerance, or after the maximum number of iterations (in which case
/// `converged` is false and the last iterate is returned).
pub fn power_iteration(
    matrix: &ComparisonMatrix,
    settings: &PowerIterationSettings,
) -> AhpResult<EigenEstimate> {
    check_entries(matrix)?;
    let n = matrix.size();
    let mut current: Vec<f64> = vec![1.0 / n as f64; n];
    let mut eigenvalue = n as f64;
    let mut iterations = 0;
    let mut converged = false;
    while iterations < settings.max_iterations {
        iterations += 1;
        let product = matrix.multiply(&current)?;
        // The iterate sums to 1, so the sum of the product estimates the eigenvalue.
        eigenvalue = product.iter().sum();
        let next: Vec<f64> = product.iter().map(|v| v / eigenvalue).collect();
        let delta: f64 = next
            .iter()
            .zip(current.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        current = next;
        if delta < settings.tolerance {
            converged = true;
            break;
        }
    }
    debug!(
        "power_iteration: eigenvalue={} iterations={} converged={}",
        eigenvalue, iterations, converged
    );
    Ok(EigenEstimate {
        vector: PriorityVector::from_weights(&current)?,
        eigenvalue,
        iterations,
        converged,
    })
}

/// Dispatches to the configured estimation method.
pub fn estimate_priority(
    matrix: &ComparisonMatrix,
    method: PriorityMethod,
    settings: &PowerIterationSettings,
) -> AhpResult<PriorityVector> {
    match method {
        PriorityMethod::GeometricMean => compute_priority(matrix),
        PriorityMethod::PowerIteration => power_iteration(matrix, settings).map(|e| e.vector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{build_matrix, Judgment, SAATY_SCALE};
    use proptest::prelude::*;

    fn reference_matrix() -> ComparisonMatrix {
        ComparisonMatrix::from_rows(&[
            vec![1.0, 3.0, 5.0],
            vec![1.0 / 3.0, 1.0, 2.0],
            vec![1.0 / 5.0, 1.0 / 2.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn known_example() {
        let p = compute_priority(&reference_matrix()).unwrap();
        let expected = [0.6483, 0.2297, 0.1220];
        for (w, e) in p.weights().iter().zip(expected.iter()) {
            assert!((w - e).abs() < 1e-3, "{:?}", p);
        }
    }

    // Saaty's textbook matrix, usually quoted with the eigenvector [0.633, 0.260, 0.106].
    #[test]
    fn textbook_example() {
        let m = ComparisonMatrix::from_rows(&[
            vec![1.0, 3.0, 5.0],
            vec![1.0 / 3.0, 1.0, 3.0],
            vec![1.0 / 5.0, 1.0 / 3.0, 1.0],
        ])
        .unwrap();
        let p = compute_priority(&m).unwrap();
        let expected = [0.633, 0.260, 0.106];
        for (w, e) in p.weights().iter().zip(expected.iter()) {
            assert!((w - e).abs() < 5e-3, "{:?}", p);
        }
    }

    #[test]
    fn single_element() {
        let p = compute_priority(&ComparisonMatrix::identity(1)).unwrap();
        assert_eq!(p.weights(), &[1.0]);
    }

    #[test]
    fn methods_agree_on_consistent_matrix() {
        let m = ComparisonMatrix::from_weights(&[0.4, 0.3, 0.2, 0.1]).unwrap();
        let gm = compute_priority(&m).unwrap();
        let eig = power_iteration(&m, &PowerIterationSettings::DEFAULT).unwrap();
        assert!(eig.converged);
        assert!((eig.eigenvalue - 4.0).abs() < 1e-9);
        for (a, b) in gm.weights().iter().zip(eig.vector.weights().iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        for (a, b) in gm.weights().iter().zip([0.4, 0.3, 0.2, 0.1].iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn methods_are_close_on_inconsistent_matrix() {
        let m = reference_matrix();
        let gm = compute_priority(&m).unwrap();
        let eig = estimate_priority(
            &m,
            PriorityMethod::PowerIteration,
            &PowerIterationSettings::DEFAULT,
        )
        .unwrap();
        for (a, b) in gm.weights().iter().zip(eig.weights().iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }

    #[test]
    fn iteration_limit_reports_no_convergence() {
        let settings = PowerIterationSettings {
            tolerance: 0.0,
            max_iterations: 1,
        };
        let e = power_iteration(&reference_matrix(), &settings).unwrap();
        assert!(!e.converged);
        assert_eq!(e.iterations, 1);
        // One step is already ordered and normalized.
        let w = e.vector.weights();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(w[0] > w[1] && w[1] > w[2]);
        assert!(e.eigenvalue > 3.0);

        let e = power_iteration(&reference_matrix(), &PowerIterationSettings::DEFAULT).unwrap();
        assert!(e.converged);
        assert!(e.iterations > 1);
    }

    #[test]
    fn from_weights_rejects_zero_sum() {
        assert!(matches!(
            PriorityVector::from_weights(&[0.0, 0.0]),
            Err(AhpError::InvalidInput { .. })
        ));
    }

    proptest! {
        #[test]
        fn three_by_three_priorities_sum_to_one(
            a in 0usize..17,
            b in 0usize..17,
            c in 0usize..17,
        ) {
            let judgments = vec![
                Judgment::new(0, 1, SAATY_SCALE[a]),
                Judgment::new(0, 2, SAATY_SCALE[b]),
                Judgment::new(1, 2, SAATY_SCALE[c]),
            ];
            let m = build_matrix(3, &judgments).unwrap();
            let p = compute_priority(&m).unwrap();
            prop_assert!(p.weights().iter().all(|w| *w > 0.0));
            let total: f64 = p.weights().iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
        }
    }
}
