use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::*;
use crate::matrix::ComparisonMatrix;

/// Scores derived from raw measurements, one per alternative.
///
/// They feed the synthesis exactly like a priority vector: the aggregator
/// normalizes or max-scales them depending on the mode.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DirectInputScores {
    pub scores: Vec<f64>,
    /// All the raw values were identical: the criterion cannot separate the
    /// alternatives.
    pub non_discriminating: bool,
}

impl DirectInputScores {
    /// The perfectly consistent comparison matrix implied by the scores.
    pub fn to_matrix(&self) -> AhpResult<ComparisonMatrix> {
        ensure!(
            self.scores.iter().all(|s| *s > 0.0),
            InvalidInputSnafu {
                reason: "a zero score has no pairwise ratio"
            }
        );
        ComparisonMatrix::from_weights(&self.scores)
    }
}

/// Turns raw values into scores where higher is better.
///
/// Benefit values are kept as is. Cost values are inverted, so they must be
/// strictly positive.
///
/// # Edge Cases
///
/// Identical raw values are accepted and produce equal scores, with the
/// `non_discriminating` flag set.
pub fn normalize_direct_input(raw: &[f64], is_benefit: bool) -> AhpResult<DirectInputScores> {
    ensure!(
        !raw.is_empty(),
        InvalidInputSnafu {
            reason: "no raw values"
        }
    );
    for v in raw.iter() {
        ensure!(
            v.is_finite(),
            InvalidInputSnafu {
                reason: format!("raw value {} is not a number", v)
            }
        );
        if is_benefit {
            ensure!(
                *v >= 0.0,
                InvalidInputSnafu {
                    reason: format!("benefit value {} is negative", v)
                }
            );
        } else {
            ensure!(
                *v > 0.0,
                InvalidInputSnafu {
                    reason: format!("cost value {} must be strictly positive", v)
                }
            );
        }
    }
    let scores: Vec<f64> = if is_benefit {
        raw.to_vec()
    } else {
        raw.iter().map(|v| 1.0 / v).collect()
    };
    let non_discriminating = raw.iter().all(|v| *v == raw[0]);
    if non_discriminating && raw.len() > 1 {
        warn!(
            "normalize_direct_input: all {} values are equal to {}, the criterion does not discriminate",
            raw.len(),
            raw[0]
        );
    }
    debug!("normalize_direct_input: benefit={} scores={:?}", is_benefit, scores);
    Ok(DirectInputScores {
        scores,
        non_discriminating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::normalize_scores;

    #[test]
    fn benefit_values_are_kept() {
        let s = normalize_direct_input(&[10.0, 0.0, 30.0], true).unwrap();
        assert_eq!(s.scores, vec![10.0, 0.0, 30.0]);
        assert!(!s.non_discriminating);
    }

    #[test]
    fn cost_values_are_inverted() {
        let s = normalize_direct_input(&[100.0, 200.0], false).unwrap();
        assert_eq!(s.scores, vec![0.01, 0.005]);
        let d = normalize_scores(&s.scores, AggregationMode::Distributive).unwrap();
        assert!((d[0] - 2.0 / 3.0).abs() < 1e-12);
        let i = normalize_scores(&s.scores, AggregationMode::Ideal).unwrap();
        assert_eq!(i[0], 1.0);
        assert!((i[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_cost_is_rejected() {
        assert!(matches!(
            normalize_direct_input(&[3.0, 0.0], false),
            Err(AhpError::InvalidInput { .. })
        ));
        assert!(matches!(
            normalize_direct_input(&[-1.0], true),
            Err(AhpError::InvalidInput { .. })
        ));
        assert!(matches!(
            normalize_direct_input(&[], true),
            Err(AhpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn identical_values_are_flagged() {
        let s = normalize_direct_input(&[4.0, 4.0, 4.0], false).unwrap();
        assert!(s.non_discriminating);
        assert_eq!(s.scores, vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn scores_as_matrix() {
        let s = normalize_direct_input(&[6.0, 2.0, 1.0], true).unwrap();
        let m = s.to_matrix().unwrap();
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.get(2, 0), 1.0 / 6.0);
        let zero = normalize_direct_input(&[1.0, 0.0], true).unwrap();
        assert!(zero.to_matrix().is_err());
    }
}
