use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::*;
use crate::priority::PriorityVector;

/// Overall score of every alternative, keyed by alternative id.
pub type GlobalPriorityMap = BTreeMap<String, f64>;

/// A criterion or sub-criterion of the hierarchy.
///
/// Top-level criteria have no parent and level 1. The goal itself is implicit.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub parent_id: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    pub name: String,
}

/// A validated criteria tree with the alternatives at its leaves.
///
/// Sibling order is the declaration order. It is also the row order expected
/// for the comparison matrix of their parent, and the alternatives' order is
/// the row order for the comparisons under a leaf criterion.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    criteria: Vec<Element>,
    alternatives: Vec<Alternative>,
}

impl Hierarchy {
    /// Checks the tree before accepting it: unique ids, known parents, no
    /// cycles, and levels that increase from parent to child.
    pub fn new(criteria: Vec<Element>, alternatives: Vec<Alternative>) -> AhpResult<Hierarchy> {
        ensure!(
            !criteria.is_empty(),
            InvalidHierarchySnafu {
                reason: "at least one criterion is required"
            }
        );
        ensure!(
            !alternatives.is_empty(),
            InvalidHierarchySnafu {
                reason: "at least one alternative is required"
            }
        );

        let mut by_id: HashMap<&str, &Element> = HashMap::new();
        for c in criteria.iter() {
            ensure!(
                by_id.insert(c.id.as_str(), c).is_none(),
                InvalidHierarchySnafu {
                    reason: format!("duplicate criterion id {}", c.id)
                }
            );
        }
        let mut alt_ids: HashSet<&str> = HashSet::new();
        for a in alternatives.iter() {
            ensure!(
                alt_ids.insert(a.id.as_str()),
                InvalidHierarchySnafu {
                    reason: format!("duplicate alternative id {}", a.id)
                }
            );
        }

        for c in criteria.iter() {
            if let Some(pid) = &c.parent_id {
                ensure!(
                    by_id.contains_key(pid.as_str()),
                    InvalidHierarchySnafu {
                        reason: format!("criterion {} has an unknown parent {}", c.id, pid)
                    }
                );
            }
        }

        // Walk up from every node. A chain that revisits a node is a cycle.
        for c in criteria.iter() {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut cur: &Element = c;
            seen.insert(cur.id.as_str());
            while let Some(pid) = &cur.parent_id {
                ensure!(
                    seen.insert(pid.as_str()),
                    InvalidHierarchySnafu {
                        reason: format!("cycle detected through criterion {}", pid)
                    }
                );
                cur = by_id[pid.as_str()];
            }
        }

        for c in criteria.iter() {
            match &c.parent_id {
                None => ensure!(
                    c.level == 1,
                    InvalidHierarchySnafu {
                        reason: format!("top criterion {} must have level 1, not {}", c.id, c.level)
                    }
                ),
                Some(pid) => {
                    let parent = by_id[pid.as_str()];
                    ensure!(
                        c.level > parent.level,
                        InvalidHierarchySnafu {
                            reason: format!(
                                "criterion {} (level {}) is not below its parent {} (level {})",
                                c.id, c.level, parent.id, parent.level
                            )
                        }
                    );
                }
            }
        }

        Ok(Hierarchy {
            criteria,
            alternatives,
        })
    }

    pub fn criteria(&self) -> &[Element] {
        &self.criteria
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    pub fn alternative_ids(&self) -> Vec<String> {
        self.alternatives.iter().map(|a| a.id.clone()).collect()
    }

    pub fn criterion(&self, id: &str) -> Option<&Element> {
        self.criteria.iter().find(|c| c.id == id)
    }

    /// The children of a criterion, or the top criteria when `parent` is `None`.
    pub fn children(&self, parent: Option<&str>) -> Vec<&Element> {
        self.criteria
            .iter()
            .filter(|c| c.parent_id.as_deref() == parent)
            .collect()
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        !self
            .criteria
            .iter()
            .any(|c| c.parent_id.as_deref() == Some(id))
    }

    /// The criteria under which alternatives are evaluated, in declaration order.
    pub fn leaf_criteria(&self) -> Vec<&Element> {
        self.criteria
            .iter()
            .filter(|c| self.is_leaf(c.id.as_str()))
            .collect()
    }
}

/// Local priorities of a hierarchy: the goal's vector over the top criteria,
/// and one vector per non-leaf criterion over its children.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LocalPriorities {
    pub goal: PriorityVector,
    pub by_criterion: BTreeMap<String, PriorityVector>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RankedAlternative {
    pub rank: usize,
    pub alternative_id: String,
    pub score: f64,
}

/// The full outcome of a hierarchical synthesis.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub mode: AggregationMode,
    /// Global weight of every criterion (leaf and non-leaf).
    pub criterion_weights: BTreeMap<String, f64>,
    pub scores: GlobalPriorityMap,
    /// For each alternative, what every leaf criterion contributed to its score.
    pub contributions: BTreeMap<String, BTreeMap<String, f64>>,
    pub ranking: Vec<RankedAlternative>,
}

fn check_local_vector(what: &str, vector: &PriorityVector, expected: usize) -> AhpResult<()> {
    ensure!(
        vector.len() == expected,
        DimensionMismatchSnafu {
            what,
            expected,
            actual: vector.len(),
        }
    );
    Ok(())
}

/// Multiplies the local priorities down the tree.
pub fn global_weights(
    hierarchy: &Hierarchy,
    local: &LocalPriorities,
) -> AhpResult<BTreeMap<String, f64>> {
    let mut res: BTreeMap<String, f64> = BTreeMap::new();
    let top = hierarchy.children(None);
    check_local_vector("goal priorities", &local.goal, top.len())?;
    let mut pending: Vec<(&Element, f64)> = top
        .into_iter()
        .zip(local.goal.weights().iter())
        .map(|(c, w)| (c, *w))
        .collect();

    while let Some((c, weight)) = pending.pop() {
        res.insert(c.id.clone(), weight);
        let children = hierarchy.children(Some(c.id.as_str()));
        if children.is_empty() {
            continue;
        }
        let v = local
            .by_criterion
            .get(&c.id)
            .context(InvalidHierarchySnafu {
                reason: format!("no local priorities for criterion {}", c.id),
            })?;
        check_local_vector(&format!("priorities of {}", c.id), v, children.len())?;
        for (child, w) in children.into_iter().zip(v.weights().iter()) {
            pending.push((child, weight * w));
        }
    }
    debug!("global_weights: {:?}", res);
    Ok(res)
}

/// Global weights of the leaf criteria only. They sum to 1.
pub fn leaf_weights(
    hierarchy: &Hierarchy,
    local: &LocalPriorities,
) -> AhpResult<BTreeMap<String, f64>> {
    let all = global_weights(hierarchy, local)?;
    Ok(all
        .into_iter()
        .filter(|(id, _)| hierarchy.is_leaf(id))
        .collect())
}

/// Rescales the scores of the alternatives under one criterion.
///
/// All-zero scores do not discriminate: every alternative gets the same
/// share, `1/n` in distributive mode and `1` in ideal mode.
pub fn normalize_scores(scores: &[f64], mode: AggregationMode) -> AhpResult<Vec<f64>> {
    ensure!(
        scores.iter().all(|s| s.is_finite() && *s >= 0.0),
        InvalidInputSnafu {
            reason: format!("scores must be non-negative numbers: {:?}", scores)
        }
    );
    let scale = match mode {
        AggregationMode::Distributive => scores.iter().sum::<f64>(),
        AggregationMode::Ideal => scores.iter().cloned().fold(0.0, f64::max),
    };
    if scale == 0.0 {
        warn!(
            "normalize_scores: all {} scores are zero, the criterion does not discriminate",
            scores.len()
        );
        let share = match mode {
            AggregationMode::Distributive => 1.0 / scores.len() as f64,
            AggregationMode::Ideal => 1.0,
        };
        return Ok(vec![share; scores.len()]);
    }
    Ok(scores.iter().map(|s| s / scale).collect())
}

type Contributions = BTreeMap<String, BTreeMap<String, f64>>;

fn combine_detailed(
    leaf_weights: &BTreeMap<String, f64>,
    leaf_scores: &BTreeMap<String, Vec<f64>>,
    alternatives: &[String],
    mode: AggregationMode,
) -> AhpResult<(GlobalPriorityMap, Contributions)> {
    let mut totals: GlobalPriorityMap = alternatives.iter().map(|a| (a.clone(), 0.0)).collect();
    let mut contributions: Contributions = alternatives
        .iter()
        .map(|a| (a.clone(), BTreeMap::new()))
        .collect();
    for (criterion, weight) in leaf_weights.iter() {
        let scores = leaf_scores
            .get(criterion)
            .context(InvalidHierarchySnafu {
                reason: format!("no alternative scores under criterion {}", criterion),
            })?;
        ensure!(
            scores.len() == alternatives.len(),
            DimensionMismatchSnafu {
                what: format!("scores under {}", criterion),
                expected: alternatives.len(),
                actual: scores.len(),
            }
        );
        let normalized = normalize_scores(scores, mode)?;
        for (alt, s) in alternatives.iter().zip(normalized.iter()) {
            let part = weight * s;
            if let Some(t) = totals.get_mut(alt) {
                *t += part;
            }
            if let Some(c) = contributions.get_mut(alt) {
                c.insert(criterion.clone(), part);
            }
        }
    }
    Ok((totals, contributions))
}

/// Weighted sum of the normalized alternative scores over the leaf criteria.
///
/// `leaf_scores` holds, for every leaf criterion, one raw score per
/// alternative in the order of `alternatives`.
pub fn combine_scores(
    leaf_weights: &BTreeMap<String, f64>,
    leaf_scores: &BTreeMap<String, Vec<f64>>,
    alternatives: &[String],
    mode: AggregationMode,
) -> AhpResult<GlobalPriorityMap> {
    combine_detailed(leaf_weights, leaf_scores, alternatives, mode).map(|(t, _)| t)
}

/// Propagates the local priorities and the alternative scores into one
/// global score per alternative.
pub fn aggregate_hierarchy(
    hierarchy: &Hierarchy,
    local: &LocalPriorities,
    leaf_scores: &BTreeMap<String, Vec<f64>>,
    mode: AggregationMode,
) -> AhpResult<GlobalPriorityMap> {
    synthesize(hierarchy, local, leaf_scores, mode).map(|s| s.scores)
}

/// Same as [aggregate_hierarchy], with the intermediate results.
pub fn synthesize(
    hierarchy: &Hierarchy,
    local: &LocalPriorities,
    leaf_scores: &BTreeMap<String, Vec<f64>>,
    mode: AggregationMode,
) -> AhpResult<Synthesis> {
    let criterion_weights = global_weights(hierarchy, local)?;
    let leaves: BTreeMap<String, f64> = criterion_weights
        .iter()
        .filter(|(id, _)| hierarchy.is_leaf(id))
        .map(|(id, w)| (id.clone(), *w))
        .collect();
    let (scores, contributions) =
        combine_detailed(&leaves, leaf_scores, &hierarchy.alternative_ids(), mode)?;
    let ranking = rank_alternatives(&scores);
    info!(
        "synthesize: {} criteria, {} alternatives, mode {:?}, leader {:?}",
        criterion_weights.len(),
        scores.len(),
        mode,
        ranking.first().map(|r| r.alternative_id.clone())
    );
    Ok(Synthesis {
        mode,
        criterion_weights,
        scores,
        contributions,
        ranking,
    })
}

/// Sorts by decreasing score. Equal scores are ordered by id.
pub fn rank_alternatives(scores: &GlobalPriorityMap) -> Vec<RankedAlternative> {
    let mut sorted: Vec<(&String, &f64)> = scores.iter().collect();
    // The map iterates by id, and the sort is stable.
    sorted.sort_by(|a, b| b.1.total_cmp(a.1));
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, (id, score))| RankedAlternative {
            rank: idx + 1,
            alternative_id: id.clone(),
            score: *score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn element(id: &str, level: u32, parent: Option<&str>) -> Element {
        Element {
            id: id.to_string(),
            name: id.to_uppercase(),
            level,
            parent_id: parent.map(|p| p.to_string()),
        }
    }

    fn alternatives(ids: &[&str]) -> Vec<Alternative> {
        ids.iter()
            .map(|id| Alternative {
                id: id.to_string(),
                name: id.to_string(),
            })
            .collect()
    }

    fn pv(w: &[f64]) -> PriorityVector {
        PriorityVector::from_weights(w).unwrap()
    }

    // goal -> cost (0.5), quality (0.5); quality -> speed (0.6), comfort (0.4)
    fn two_level() -> Hierarchy {
        Hierarchy::new(
            vec![
                element("cost", 1, None),
                element("quality", 1, None),
                element("speed", 2, Some("quality")),
                element("comfort", 2, Some("quality")),
            ],
            alternatives(&["a", "b"]),
        )
        .unwrap()
    }

    fn two_level_local() -> LocalPriorities {
        LocalPriorities {
            goal: pv(&[0.5, 0.5]),
            by_criterion: [("quality".to_string(), pv(&[0.6, 0.4]))]
                .into_iter()
                .collect(),
        }
    }

    fn scores(entries: &[(&str, Vec<f64>)]) -> BTreeMap<String, Vec<f64>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn rejects_cycles() {
        let res = Hierarchy::new(
            vec![
                element("a", 1, None),
                element("b", 2, Some("c")),
                element("c", 3, Some("b")),
            ],
            alternatives(&["x"]),
        );
        match res {
            Err(AhpError::InvalidHierarchy { reason }) => assert!(reason.contains("cycle")),
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn rejects_bad_structure() {
        let dangling = Hierarchy::new(vec![element("a", 2, Some("z"))], alternatives(&["x"]));
        assert!(matches!(dangling, Err(AhpError::InvalidHierarchy { .. })));

        let dup = Hierarchy::new(
            vec![element("a", 1, None), element("a", 1, None)],
            alternatives(&["x"]),
        );
        assert!(matches!(dup, Err(AhpError::InvalidHierarchy { .. })));

        let levels = Hierarchy::new(
            vec![element("a", 1, None), element("b", 1, Some("a"))],
            alternatives(&["x"]),
        );
        assert!(matches!(levels, Err(AhpError::InvalidHierarchy { .. })));

        let no_alt = Hierarchy::new(vec![element("a", 1, None)], vec![]);
        assert!(matches!(no_alt, Err(AhpError::InvalidHierarchy { .. })));
    }

    #[test]
    fn global_weights_multiply_down() {
        let h = two_level();
        let w = global_weights(&h, &two_level_local()).unwrap();
        assert_eq!(w["cost"], 0.5);
        assert_eq!(w["quality"], 0.5);
        assert!((w["speed"] - 0.3).abs() < 1e-12);
        assert!((w["comfort"] - 0.2).abs() < 1e-12);
        let leaves = leaf_weights(&h, &two_level_local()).unwrap();
        assert_eq!(leaves.len(), 3);
        assert!((leaves.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_local_vector() {
        let h = two_level();
        let local = LocalPriorities {
            goal: pv(&[0.5, 0.5]),
            by_criterion: BTreeMap::new(),
        };
        assert!(matches!(
            global_weights(&h, &local),
            Err(AhpError::InvalidHierarchy { .. })
        ));
        let wrong = LocalPriorities {
            goal: pv(&[0.2, 0.3, 0.5]),
            by_criterion: BTreeMap::new(),
        };
        assert!(matches!(
            global_weights(&h, &wrong),
            Err(AhpError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn distributive_and_ideal() {
        let h = two_level();
        let leaf = scores(&[
            ("cost", vec![1.0, 3.0]),
            ("speed", vec![3.0, 1.0]),
            ("comfort", vec![1.0, 1.0]),
        ]);
        let d = aggregate_hierarchy(&h, &two_level_local(), &leaf, AggregationMode::Distributive)
            .unwrap();
        // a: 0.5*0.25 + 0.3*0.75 + 0.2*0.5 = 0.45
        assert!((d["a"] - 0.45).abs() < 1e-12);
        assert!((d["b"] - 0.55).abs() < 1e-12);

        let i = aggregate_hierarchy(&h, &two_level_local(), &leaf, AggregationMode::Ideal).unwrap();
        // a: 0.5/3 + 0.3 + 0.2 ; b: 0.5 + 0.3/3 + 0.2
        assert!((i["a"] - (0.5 / 3.0 + 0.5)).abs() < 1e-12);
        assert!((i["b"] - 0.8).abs() < 1e-12);
        assert!(i.values().sum::<f64>() > 1.0);
    }

    #[test]
    fn synthesis_details() {
        let h = two_level();
        let leaf = scores(&[
            ("cost", vec![1.0, 3.0]),
            ("speed", vec![3.0, 1.0]),
            ("comfort", vec![1.0, 1.0]),
        ]);
        let s = synthesize(&h, &two_level_local(), &leaf, AggregationMode::Ideal).unwrap();
        assert_eq!(s.criterion_weights.len(), 4);
        assert_eq!(s.contributions["b"]["cost"], 0.5);
        assert_eq!(s.ranking[0].alternative_id, "b");
        assert_eq!(s.ranking[0].rank, 1);
        assert_eq!(s.ranking[1].rank, 2);
    }

    #[test]
    fn score_errors() {
        let h = two_level();
        let missing = scores(&[("cost", vec![1.0, 3.0]), ("speed", vec![3.0, 1.0])]);
        assert!(matches!(
            aggregate_hierarchy(&h, &two_level_local(), &missing, AggregationMode::Ideal),
            Err(AhpError::InvalidHierarchy { .. })
        ));
        let short = scores(&[
            ("cost", vec![1.0]),
            ("speed", vec![3.0, 1.0]),
            ("comfort", vec![1.0, 1.0]),
        ]);
        assert!(matches!(
            aggregate_hierarchy(&h, &two_level_local(), &short, AggregationMode::Ideal),
            Err(AhpError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            normalize_scores(&[1.0, -1.0], AggregationMode::Distributive),
            Err(AhpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn all_zero_scores_do_not_discriminate() {
        let h = two_level();
        let leaf_scores = scores(&[
            ("cost", vec![1.0, 3.0]),
            ("speed", vec![0.0, 0.0]),
            ("comfort", vec![3.0, 1.0]),
        ]);
        // cost 0.5, speed 0.3, comfort 0.2
        let d = aggregate_hierarchy(&h, &two_level_local(), &leaf_scores, AggregationMode::Distributive)
            .unwrap();
        assert!((d["a"] - (0.5 * 0.25 + 0.3 * 0.5 + 0.2 * 0.75)).abs() < 1e-12);
        assert!((d["b"] - (0.5 * 0.75 + 0.3 * 0.5 + 0.2 * 0.25)).abs() < 1e-12);
        let i = aggregate_hierarchy(&h, &two_level_local(), &leaf_scores, AggregationMode::Ideal)
            .unwrap();
        assert!((i["a"] - (0.5 / 3.0 + 0.3 + 0.2)).abs() < 1e-12);
        assert!((i["b"] - (0.5 + 0.3 + 0.2 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn ties_are_ranked_by_id() {
        let scores: GlobalPriorityMap = [("b", 0.3), ("c", 0.4), ("a", 0.3)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let ranking = rank_alternatives(&scores);
        let ids: Vec<&str> = ranking.iter().map(|r| r.alternative_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    fn flat_case() -> impl Strategy<Value = (Vec<f64>, Vec<Vec<f64>>)> {
        (2usize..5, 2usize..6).prop_flat_map(|(nc, na)| {
            (
                proptest::collection::vec(0.01f64..1.0, nc),
                proptest::collection::vec(proptest::collection::vec(0.01f64..10.0, na), nc),
            )
        })
    }

    fn flat_setup(
        weights: &[f64],
        table: &[Vec<f64>],
    ) -> (Hierarchy, LocalPriorities, BTreeMap<String, Vec<f64>>) {
        let crits: Vec<Element> = (0..weights.len())
            .map(|k| element(&format!("c{}", k), 1, None))
            .collect();
        let alt_ids: Vec<String> = (0..table[0].len()).map(|k| format!("a{}", k)).collect();
        let alt_refs: Vec<&str> = alt_ids.iter().map(|s| s.as_str()).collect();
        let h = Hierarchy::new(crits, alternatives(&alt_refs)).unwrap();
        let local = LocalPriorities {
            goal: pv(weights),
            by_criterion: BTreeMap::new(),
        };
        let leaf = table
            .iter()
            .enumerate()
            .map(|(k, row)| (format!("c{}", k), row.clone()))
            .collect();
        (h, local, leaf)
    }

    proptest! {
        #[test]
        fn distributive_totals_sum_to_one((weights, table) in flat_case()) {
            let (h, local, leaf) = flat_setup(&weights, &table);
            let res = aggregate_hierarchy(&h, &local, &leaf, AggregationMode::Distributive).unwrap();
            prop_assert!((res.values().sum::<f64>() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn ideal_best_gets_full_criterion_weight((weights, table) in flat_case()) {
            let (h, local, leaf) = flat_setup(&weights, &table);
            let s = synthesize(&h, &local, &leaf, AggregationMode::Ideal).unwrap();
            let crit_weight = s.criterion_weights["c0"];
            let row = &table[0];
            let best = row
                .iter()
                .enumerate()
                .fold(0, |b, (k, v)| if *v > row[b] { k } else { b });
            let contribution = s.contributions[&format!("a{}", best)]["c0"];
            prop_assert_eq!(contribution, crit_weight);
        }
    }
}
