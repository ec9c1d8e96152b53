use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::*;

/// The 17 values of Saaty's ratio scale, in increasing order.
pub const SAATY_SCALE: [f64; 17] = [
    1.0 / 9.0,
    1.0 / 8.0,
    1.0 / 7.0,
    1.0 / 6.0,
    1.0 / 5.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    9.0,
];

const SCALE_TOLERANCE: f64 = 1e-6;
const RECIPROCAL_TOLERANCE: f64 = 1e-9;

/// One judgment: element `i` is `value` times as important as element `j`.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Judgment {
    pub i: usize,
    pub j: usize,
    pub value: f64,
}

impl Judgment {
    pub fn new(i: usize, j: usize, value: f64) -> Judgment {
        Judgment { i, j, value }
    }

    // Maps the judgment onto the authoritative upper cell.
    fn canonical(&self) -> (usize, usize, f64) {
        if self.i < self.j {
            (self.i, self.j, self.value)
        } else {
            (self.j, self.i, 1.0 / self.value)
        }
    }
}

/// Returns the value of the scale that matches `value`, if any.
pub fn scale_value(value: f64) -> Option<f64> {
    SAATY_SCALE
        .iter()
        .find(|s| (**s - value).abs() <= SCALE_TOLERANCE * s.max(1.0))
        .cloned()
}

/// The scale value closest to a positive ratio, measured in log space so that
/// 1/3 and 3 are equally far from 1.
pub fn nearest_scale_value(ratio: f64) -> f64 {
    let target = ratio.ln();
    let mut best = SAATY_SCALE[0];
    let mut best_dist = f64::INFINITY;
    for s in SAATY_SCALE.iter() {
        let dist = (s.ln() - target).abs();
        if dist < best_dist {
            best = *s;
            best_dist = dist;
        }
    }
    best
}

/// A square reciprocal matrix of pairwise comparisons.
///
/// The diagonal is exactly 1 and `get(j, i) == 1 / get(i, j)` for every cell,
/// which is enforced by all the constructors.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl ComparisonMatrix {
    /// The neutral matrix: every element as important as every other.
    pub fn identity(size: usize) -> ComparisonMatrix {
        ComparisonMatrix {
            size,
            cells: vec![1.0; size * size],
        }
    }

    /// Validates a dense matrix coming from outside the builder.
    pub fn from_rows(rows: &[Vec<f64>]) -> AhpResult<ComparisonMatrix> {
        let size = rows.len();
        ensure!(
            size > 0,
            InvalidMatrixSnafu {
                reason: "the matrix is empty"
            }
        );
        let mut cells = Vec::with_capacity(size * size);
        for (i, row) in rows.iter().enumerate() {
            ensure!(
                row.len() == size,
                DimensionMismatchSnafu {
                    what: format!("row {}", i),
                    expected: size,
                    actual: row.len(),
                }
            );
            for (j, v) in row.iter().enumerate() {
                ensure!(
                    v.is_finite() && *v > 0.0,
                    InvalidMatrixSnafu {
                        reason: format!("entry ({}, {}) is not a positive number: {}", i, j, v)
                    }
                );
                cells.push(*v);
            }
        }
        let m = ComparisonMatrix { size, cells };
        for i in 0..size {
            ensure!(
                (m.get(i, i) - 1.0).abs() <= RECIPROCAL_TOLERANCE,
                InvalidMatrixSnafu {
                    reason: format!("diagonal entry {} is {}", i, m.get(i, i))
                }
            );
            for j in (i + 1)..size {
                let product = m.get(i, j) * m.get(j, i);
                ensure!(
                    (product - 1.0).abs() <= RECIPROCAL_TOLERANCE,
                    InvalidMatrixSnafu {
                        reason: format!("entries ({}, {}) and ({}, {}) are not reciprocal", i, j, j, i)
                    }
                );
            }
        }
        Ok(m)
    }

    /// The perfectly consistent matrix `M[i][j] = w[i] / w[j]`.
    pub fn from_weights(weights: &[f64]) -> AhpResult<ComparisonMatrix> {
        let size = weights.len();
        ensure!(
            size > 0,
            InvalidMatrixSnafu {
                reason: "no weights"
            }
        );
        ensure!(
            weights.iter().all(|w| w.is_finite() && *w > 0.0),
            InvalidMatrixSnafu {
                reason: "all the weights must be positive"
            }
        );
        let mut m = ComparisonMatrix::identity(size);
        for i in 0..size {
            for j in (i + 1)..size {
                m.set_upper(i, j, weights[i] / weights[j]);
            }
        }
        Ok(m)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.cells[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.cells[i * self.size..(i + 1) * self.size]
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.size).map(|i| self.row(i).to_vec()).collect()
    }

    /// Matrix-vector product.
    pub fn multiply(&self, v: &[f64]) -> AhpResult<Vec<f64>> {
        ensure!(
            v.len() == self.size,
            DimensionMismatchSnafu {
                what: "vector",
                expected: self.size,
                actual: v.len(),
            }
        );
        Ok((0..self.size)
            .map(|i| self.row(i).iter().zip(v.iter()).map(|(a, b)| a * b).sum())
            .collect())
    }

    // Writes the upper cell and its reciprocal.
    pub(crate) fn set_upper(&mut self, i: usize, j: usize, value: f64) {
        self.set_pair(i, j, value, 1.0 / value);
    }

    fn set_pair(&mut self, i: usize, j: usize, upper: f64, lower: f64) {
        let n = self.size;
        self.cells[i * n + j] = upper;
        self.cells[j * n + i] = lower;
    }
}

fn check_judgment(n: usize, judgment: &Judgment) -> AhpResult<()> {
    ensure!(
        judgment.i < n,
        DimensionMismatchSnafu {
            what: format!("judgment index i={}", judgment.i),
            expected: n,
            actual: judgment.i + 1,
        }
    );
    ensure!(
        judgment.j < n,
        DimensionMismatchSnafu {
            what: format!("judgment index j={}", judgment.j),
            expected: n,
            actual: judgment.j + 1,
        }
    );
    ensure!(
        judgment.i != judgment.j,
        InvalidMatrixSnafu {
            reason: format!("judgment on the diagonal ({}, {})", judgment.i, judgment.j)
        }
    );
    ensure!(
        judgment.value.is_finite() && judgment.value > 0.0,
        InvalidMatrixSnafu {
            reason: format!(
                "judgment ({}, {}) has a non-positive value {}",
                judgment.i, judgment.j, judgment.value
            )
        }
    );
    ensure!(
        scale_value(judgment.value).is_some(),
        InvalidMatrixSnafu {
            reason: format!(
                "judgment ({}, {}) has value {} which is not on the 1/9..9 scale",
                judgment.i, judgment.j, judgment.value
            )
        }
    );
    Ok(())
}

/// Builds the reciprocal matrix of `n` elements from a sparse list of judgments.
///
/// Cells that are not judged stay at 1. A judgment given as `(j, i)` with
/// `j > i` is stored as `(i, j, 1 / value)`. When the same cell is judged
/// several times (in either direction), the last judgment wins.
pub fn build_matrix(n: usize, judgments: &[Judgment]) -> AhpResult<ComparisonMatrix> {
    ensure!(
        n > 0,
        InvalidMatrixSnafu {
            reason: "a comparison needs at least one element"
        }
    );
    let mut m = ComparisonMatrix::identity(n);
    for judgment in judgments.iter() {
        check_judgment(n, judgment)?;
        let (i, j, value) = judgment.canonical();
        // Snap onto the exact scale value to get rid of rounding in the input.
        if value >= 1.0 {
            let s = scale_value(value).unwrap_or(value);
            m.set_pair(i, j, s, 1.0 / s);
        } else {
            let s = scale_value(1.0 / value).unwrap_or(1.0 / value);
            m.set_pair(i, j, 1.0 / s, s);
        }
    }
    debug!("build_matrix: n={} judgments={} matrix={:?}", n, judgments.len(), m.rows());
    Ok(m)
}

/// The upper cells `(i, j)` that no judgment covers, in row order.
pub fn missing_judgments(n: usize, judgments: &[Judgment]) -> Vec<(usize, usize)> {
    let mut judged = vec![false; n * n];
    for judgment in judgments.iter() {
        if judgment.i < n && judgment.j < n && judgment.i != judgment.j {
            let (i, j, _) = judgment.canonical();
            judged[i * n + j] = true;
        }
    }
    let mut missing = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if !judged[i * n + j] {
                missing.push((i, j));
            }
        }
    }
    missing
}

/// Same as [build_matrix], but all the C(n, 2) upper cells must be judged.
pub fn build_complete_matrix(n: usize, judgments: &[Judgment]) -> AhpResult<ComparisonMatrix> {
    let missing = missing_judgments(n, judgments);
    ensure!(
        missing.is_empty(),
        InvalidMatrixSnafu {
            reason: format!("missing judgments for cells {:?}", missing)
        }
    );
    build_matrix(n, judgments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unjudged_cells_are_neutral() {
        let m = build_matrix(3, &[Judgment::new(0, 1, 3.0)]).unwrap();
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.get(1, 0), 1.0 / 3.0);
        assert_eq!(m.get(0, 2), 1.0);
        assert_eq!(m.get(2, 1), 1.0);
        for i in 0..3 {
            assert_eq!(m.get(i, i), 1.0);
        }
    }

    #[test]
    fn lower_judgment_is_reciprocated() {
        let m = build_matrix(2, &[Judgment::new(1, 0, 5.0)]).unwrap();
        assert_eq!(m.get(0, 1), 1.0 / 5.0);
        assert_eq!(m.get(1, 0), 5.0);
    }

    #[test]
    fn last_write_wins() {
        let m = build_matrix(
            2,
            &[
                Judgment::new(0, 1, 3.0),
                Judgment::new(0, 1, 7.0),
            ],
        )
        .unwrap();
        assert_eq!(m.get(0, 1), 7.0);

        // Both directions land on the same cell.
        let m = build_matrix(
            2,
            &[
                Judgment::new(0, 1, 3.0),
                Judgment::new(1, 0, 4.0),
            ],
        )
        .unwrap();
        assert_eq!(m.get(0, 1), 0.25);
        assert_eq!(m.get(1, 0), 4.0);
    }

    #[test]
    fn reciprocal_invariant() {
        let judgments = vec![
            Judgment::new(0, 1, 1.0 / 7.0),
            Judgment::new(0, 2, 9.0),
            Judgment::new(1, 3, 2.0),
            Judgment::new(2, 3, 1.0 / 3.0),
        ];
        let m = build_matrix(4, &judgments).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert!((m.get(i, j) * m.get(j, i) - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn rejects_off_scale_values() {
        let res = build_matrix(3, &[Judgment::new(0, 1, 2.5)]);
        assert!(matches!(res, Err(AhpError::InvalidMatrix { .. })));
        let res = build_matrix(3, &[Judgment::new(0, 1, 0.0)]);
        assert!(matches!(res, Err(AhpError::InvalidMatrix { .. })));
        let res = build_matrix(3, &[Judgment::new(0, 1, -3.0)]);
        assert!(matches!(res, Err(AhpError::InvalidMatrix { .. })));
        let res = build_matrix(3, &[Judgment::new(1, 1, 1.0)]);
        assert!(matches!(res, Err(AhpError::InvalidMatrix { .. })));
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let res = build_matrix(3, &[Judgment::new(0, 3, 2.0)]);
        assert!(matches!(res, Err(AhpError::DimensionMismatch { .. })));
    }

    #[test]
    fn accepts_rounded_reciprocals() {
        let m = build_matrix(2, &[Judgment::new(0, 1, 0.3333333)]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn completeness() {
        let judgments = vec![Judgment::new(0, 1, 2.0), Judgment::new(2, 0, 3.0)];
        assert_eq!(missing_judgments(3, &judgments), vec![(1, 2)]);
        assert!(matches!(
            build_complete_matrix(3, &judgments),
            Err(AhpError::InvalidMatrix { .. })
        ));
        let mut all = judgments.clone();
        all.push(Judgment::new(1, 2, 1.0));
        assert!(build_complete_matrix(3, &all).is_ok());
    }

    #[test]
    fn nearest_scale() {
        assert_eq!(nearest_scale_value(2.9), 3.0);
        assert_eq!(nearest_scale_value(0.34), 1.0 / 3.0);
        assert_eq!(nearest_scale_value(40.0), 9.0);
        assert_eq!(nearest_scale_value(1.0), 1.0);
    }

    #[test]
    fn from_rows_checks_reciprocity() {
        let ok = ComparisonMatrix::from_rows(&[vec![1.0, 2.0], vec![0.5, 1.0]]);
        assert!(ok.is_ok());
        let bad = ComparisonMatrix::from_rows(&[vec![1.0, 2.0], vec![0.4, 1.0]]);
        assert!(matches!(bad, Err(AhpError::InvalidMatrix { .. })));
        let ragged = ComparisonMatrix::from_rows(&[vec![1.0, 2.0], vec![0.5]]);
        assert!(matches!(ragged, Err(AhpError::DimensionMismatch { .. })));
    }

    #[test]
    fn consistent_matrix_from_weights() {
        let m = ComparisonMatrix::from_weights(&[0.5, 0.25, 0.25]).unwrap();
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(1, 2), 1.0);
        assert_eq!(m.get(2, 0), 0.5);
    }
}
