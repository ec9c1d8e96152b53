use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;

// Two utilities (or costs) closer than this are considered equal when
// breaking ties.
const TIE_EPSILON: f64 = 1e-9;
// Slack when rounding costs up to buckets, so that 3.0000000001 buckets stay 3.
const BUCKET_EPSILON: f64 = 1e-6;
// Above this many optional items, fractional costs fall back to buckets.
const MAX_EXACT_CANDIDATES: usize = 32;
// Node limit of the branch and bound before it gives up for the buckets.
const MAX_SEARCH_NODES: usize = 2_000_000;

/// A fundable alternative: what it costs and what it brings.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BudgetItem {
    pub alternative_id: String,
    pub cost: f64,
    pub utility: f64,
}

impl BudgetItem {
    pub fn new(alternative_id: impl Into<String>, cost: f64, utility: f64) -> Self {
        BudgetItem {
            alternative_id: alternative_id.into(),
            cost,
            utility,
        }
    }

    /// Utility per unit of cost. `None` for free items.
    pub fn efficiency(&self) -> Option<f64> {
        if self.cost > 0.0 {
            Some(self.utility / self.cost)
        } else {
            None
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConstraints {
    pub mandatory: BTreeSet<String>,
    pub excluded: BTreeSet<String>,
    /// Resolution of the knapsack when costs are not small integers.
    pub max_buckets: usize,
}

impl Default for SelectionConstraints {
    fn default() -> Self {
        SelectionConstraints {
            mandatory: BTreeSet::new(),
            excluded: BTreeSet::new(),
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

/// Per-item bounds of the continuous allocation. The maximum defaults to the
/// item cost.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationBounds {
    pub min: f64,
    pub max: Option<f64>,
}

/// Review data for one item of a solution.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ItemInsight {
    pub alternative_id: String,
    pub cost: f64,
    pub utility: f64,
    /// `None` stands for the infinite efficiency of a free item.
    pub efficiency: Option<f64>,
    /// 1 is the most efficient item.
    pub efficiency_rank: usize,
    pub allocation: f64,
    /// Share of the cost that is funded. `None` for free items.
    pub utilization: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub budget: f64,
    /// Selected ids, sorted.
    pub selected: Vec<String>,
    pub total_cost: f64,
    pub total_utility: f64,
    pub budget_utilization: f64,
    pub insights: Vec<ItemInsight>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub budget: f64,
    pub allocations: BTreeMap<String, f64>,
    pub total_allocated: f64,
    /// Sum of `utility / cost * allocation`. Free items count with their full
    /// utility.
    pub objective: f64,
    pub budget_utilization: f64,
    pub insights: Vec<ItemInsight>,
}

fn check_items(items: &[BudgetItem], budget: f64) -> AhpResult<BTreeMap<&str, &BudgetItem>> {
    ensure!(
        budget.is_finite() && budget >= 0.0,
        InvalidInputSnafu {
            reason: format!("the budget must be a non-negative number: {}", budget)
        }
    );
    let mut by_id: BTreeMap<&str, &BudgetItem> = BTreeMap::new();
    for item in items.iter() {
        ensure!(
            item.cost.is_finite() && item.cost >= 0.0,
            InvalidInputSnafu {
                reason: format!("item {} has an invalid cost {}", item.alternative_id, item.cost)
            }
        );
        ensure!(
            item.utility.is_finite() && item.utility >= 0.0,
            InvalidInputSnafu {
                reason: format!(
                    "item {} has an invalid utility {}",
                    item.alternative_id, item.utility
                )
            }
        );
        ensure!(
            by_id.insert(item.alternative_id.as_str(), item).is_none(),
            InvalidInputSnafu {
                reason: format!("item {} appears twice", item.alternative_id)
            }
        );
    }
    Ok(by_id)
}

fn check_known(by_id: &BTreeMap<&str, &BudgetItem>, ids: &BTreeSet<String>) -> AhpResult<()> {
    for id in ids.iter() {
        ensure!(
            by_id.contains_key(id.as_str()),
            UnknownElementSnafu { id: id.as_str() }
        );
    }
    Ok(())
}

fn budget_utilization(spent: f64, budget: f64) -> f64 {
    if budget > 0.0 {
        spent / budget
    } else {
        0.0
    }
}

fn efficiency_order(a: &BudgetItem, b: &BudgetItem) -> Ordering {
    match (a.efficiency(), b.efficiency()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.total_cmp(&x),
    }
    .then_with(|| a.alternative_id.cmp(&b.alternative_id))
}

/// Insights for every item, given what each one received.
pub fn item_insights(items: &[BudgetItem], allocations: &BTreeMap<String, f64>) -> Vec<ItemInsight> {
    let mut sorted: Vec<&BudgetItem> = items.iter().collect();
    sorted.sort_by(|a, b| efficiency_order(a, b));
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let allocation = allocations
                .get(&item.alternative_id)
                .cloned()
                .unwrap_or(0.0);
            ItemInsight {
                alternative_id: item.alternative_id.clone(),
                cost: item.cost,
                utility: item.utility,
                efficiency: item.efficiency(),
                efficiency_rank: idx + 1,
                allocation,
                utilization: if item.cost > 0.0 {
                    Some(allocation / item.cost)
                } else {
                    None
                },
            }
        })
        .collect()
}

// ***** Binary knapsack *****

#[derive(Debug, Clone, Copy)]
struct Value {
    utility: f64,
    cost: f64,
}

impl Value {
    const EMPTY: Value = Value {
        utility: 0.0,
        cost: 0.0,
    };

    fn plus(&self, item: &BudgetItem) -> Value {
        Value {
            utility: self.utility + item.utility,
            cost: self.cost + item.cost,
        }
    }

    fn better_than(&self, other: &Value) -> bool {
        if self.utility > other.utility + TIE_EPSILON {
            return true;
        }
        (self.utility - other.utility).abs() <= TIE_EPSILON && self.cost < other.cost - TIE_EPSILON
    }

    fn same_as(&self, other: &Value) -> bool {
        (self.utility - other.utility).abs() <= TIE_EPSILON
            && (self.cost - other.cost).abs() <= TIE_EPSILON
    }
}

// Maps real costs onto integer buckets. Costs are rounded up so that any
// selection that fits in the buckets also fits in the real budget.
struct Buckets {
    unit: Option<f64>,
    capacity: usize,
    // Unit buckets over integral costs: the search over buckets is exact.
    exact: bool,
}

impl Buckets {
    fn new(costs: &[f64], remaining: f64, max_buckets: usize) -> Buckets {
        if remaining <= 0.0 {
            return Buckets {
                unit: None,
                capacity: 0,
                exact: true,
            };
        }
        let integral = remaining.fract() == 0.0 && costs.iter().all(|c| c.fract() == 0.0);
        if integral && remaining <= max_buckets as f64 {
            Buckets {
                unit: Some(1.0),
                capacity: remaining as usize,
                exact: true,
            }
        } else {
            Buckets {
                unit: Some(remaining / max_buckets as f64),
                capacity: max_buckets,
                exact: false,
            }
        }
    }

    fn weight(&self, cost: f64) -> Option<usize> {
        if cost == 0.0 {
            return Some(0);
        }
        let unit = self.unit?;
        let w = (cost / unit - BUCKET_EPSILON).ceil().max(0.0);
        if w > self.capacity as f64 {
            None
        } else {
            Some(w as usize)
        }
    }
}

// Dynamic program over cost buckets. Returns the indices of the chosen
// candidates, preferring the earliest ones among equal values.
fn bucket_search(candidates: &[&BudgetItem], buckets: &Buckets) -> Vec<usize> {
    let weights: Vec<Option<usize>> = candidates.iter().map(|i| buckets.weight(i.cost)).collect();
    let cap = buckets.capacity;

    // best[k][c]: best value using the items k.. with c buckets.
    let n = candidates.len();
    let mut best: Vec<Vec<Value>> = vec![vec![Value::EMPTY; cap + 1]; n + 1];
    for k in (0..n).rev() {
        for c in 0..=cap {
            let skip = best[k + 1][c];
            best[k][c] = match weights[k] {
                Some(w) if w <= c => {
                    let take = best[k + 1][c - w].plus(candidates[k]);
                    if take.better_than(&skip) {
                        take
                    } else {
                        skip
                    }
                }
                _ => skip,
            };
        }
    }

    let mut chosen = Vec::new();
    let mut c = cap;
    for k in 0..n {
        // The empty set is the smallest of all: stop once nothing is left to gain.
        if best[k][c].same_as(&Value::EMPTY) {
            break;
        }
        if let Some(w) = weights[k] {
            if w <= c && best[k + 1][c - w].plus(candidates[k]).same_as(&best[k][c]) {
                chosen.push(k);
                c -= w;
            }
        }
    }
    chosen
}

// Upper bound on the utility the candidates `from..` can add within
// `capacity`: the greedy fill of the linear relaxation.
fn relaxation_bound(
    candidates: &[&BudgetItem],
    by_efficiency: &[usize],
    from: usize,
    capacity: f64,
) -> f64 {
    let mut left = capacity.max(0.0);
    let mut bound = 0.0;
    for k in by_efficiency.iter().filter(|k| **k >= from) {
        let item = candidates[*k];
        if item.cost <= left {
            bound += item.utility;
            left -= item.cost;
        } else {
            bound += item.utility * left / item.cost;
            break;
        }
    }
    bound
}

// Depth-first branch and bound over the candidates, taking an item before
// skipping it so that equal values keep the earliest ids.
struct BranchAndBound<'a> {
    candidates: &'a [&'a BudgetItem],
    by_efficiency: Vec<usize>,
    capacity: f64,
    current: Vec<usize>,
    best: Value,
    best_set: Vec<usize>,
    nodes: usize,
}

impl<'a> BranchAndBound<'a> {
    fn new(candidates: &'a [&'a BudgetItem], capacity: f64) -> Self {
        let mut by_efficiency: Vec<usize> = (0..candidates.len()).collect();
        by_efficiency.sort_by(|a, b| efficiency_order(candidates[*a], candidates[*b]));
        BranchAndBound {
            candidates,
            by_efficiency,
            capacity,
            current: Vec::new(),
            best: Value::EMPTY,
            best_set: Vec::new(),
            nodes: 0,
        }
    }

    // The best selection, or `None` when the node limit was hit.
    fn run(mut self) -> Option<Vec<usize>> {
        self.explore(0, Value::EMPTY);
        debug!("branch and bound: {} nodes", self.nodes);
        if self.nodes > MAX_SEARCH_NODES {
            None
        } else {
            Some(self.best_set)
        }
    }

    fn explore(&mut self, k: usize, value: Value) {
        self.nodes += 1;
        if self.nodes > MAX_SEARCH_NODES {
            return;
        }
        if value.better_than(&self.best) {
            self.best = value;
            self.best_set = self.current.clone();
        }
        if k == self.candidates.len() {
            return;
        }
        let bound = relaxation_bound(
            self.candidates,
            &self.by_efficiency,
            k,
            self.capacity - value.cost,
        );
        let reachable = value.utility + bound;
        if reachable < self.best.utility - TIE_EPSILON {
            return;
        }
        // Costs only grow from here, so a utility tie cannot win either.
        if reachable <= self.best.utility + TIE_EPSILON && value.cost >= self.best.cost - TIE_EPSILON {
            return;
        }
        let item = self.candidates[k];
        if value.cost + item.cost <= self.capacity + TIE_EPSILON {
            self.current.push(k);
            self.explore(k + 1, value.plus(item));
            self.current.pop();
        }
        self.explore(k + 1, value);
    }
}

/// Chooses the subset of items with the largest total utility whose total
/// cost fits in the budget.
///
/// Mandatory items are always selected and paid for first. Excluded items
/// are never selected. Among the optional items, ties go to the lower total
/// cost, then to the earliest ids.
///
/// Integral costs are searched exactly with a dynamic program over unit
/// buckets when the budget fits under `max_buckets`. Other costs go through
/// an exact branch and bound, up to `MAX_EXACT_CANDIDATES` optional items.
/// Past that, the remaining budget is split into `max_buckets` buckets with
/// costs rounded up; every selected item can then lose up to one bucket, so
/// the leftover budget is filled afterwards with the unselected items that
/// still fit, in id order.
pub fn optimize_budget_binary(
    items: &[BudgetItem],
    budget: f64,
    constraints: &SelectionConstraints,
) -> AhpResult<Selection> {
    let by_id = check_items(items, budget)?;
    check_known(&by_id, &constraints.mandatory)?;
    check_known(&by_id, &constraints.excluded)?;
    if let Some(id) = constraints.mandatory.intersection(&constraints.excluded).next() {
        return InvalidInputSnafu {
            reason: format!("item {} is both mandatory and excluded", id),
        }
        .fail();
    }
    ensure!(
        constraints.max_buckets > 0,
        InvalidInputSnafu {
            reason: "max_buckets must be positive"
        }
    );

    let mandatory_cost: f64 = constraints
        .mandatory
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|i| i.cost)
        .sum();
    ensure!(
        mandatory_cost <= budget + TIE_EPSILON,
        InfeasibleBudgetSnafu {
            required: mandatory_cost,
            budget,
        }
    );
    let remaining = (budget - mandatory_cost).max(0.0);

    // Sorted by id: the searches prefer the earliest ids.
    let candidates: Vec<&BudgetItem> = by_id
        .values()
        .filter(|i| {
            !constraints.mandatory.contains(&i.alternative_id)
                && !constraints.excluded.contains(&i.alternative_id)
        })
        .cloned()
        .collect();
    let costs: Vec<f64> = by_id.values().map(|i| i.cost).collect();
    let buckets = Buckets::new(&costs, remaining, constraints.max_buckets);

    let exact: Option<Vec<usize>> = if buckets.exact {
        debug!(
            "optimize_budget_binary: {} candidates, {} unit buckets",
            candidates.len(),
            buckets.capacity
        );
        Some(bucket_search(&candidates, &buckets))
    } else if candidates.len() <= MAX_EXACT_CANDIDATES {
        BranchAndBound::new(&candidates, remaining).run()
    } else {
        None
    };
    let picked: Vec<usize> = if let Some(p) = exact {
        p
    } else {
        debug!(
            "optimize_budget_binary: {} candidates, {} buckets of {:?}",
            candidates.len(),
            buckets.capacity,
            buckets.unit
        );
        let mut picked = bucket_search(&candidates, &buckets);
        let mut spent: f64 = picked.iter().map(|k| candidates[*k].cost).sum();
        for (k, item) in candidates.iter().enumerate() {
            if !picked.contains(&k)
                && item.utility > 0.0
                && spent + item.cost <= remaining + TIE_EPSILON
            {
                picked.push(k);
                spent += item.cost;
            }
        }
        picked
    };

    let mut chosen: BTreeSet<String> = constraints.mandatory.clone();
    for k in picked.into_iter() {
        chosen.insert(candidates[k].alternative_id.clone());
    }

    let selected: Vec<String> = chosen.into_iter().collect();
    let total_cost: f64 = selected
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|i| i.cost)
        .sum();
    let total_utility: f64 = selected
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|i| i.utility)
        .sum();
    let allocations: BTreeMap<String, f64> = selected
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|i| (i.alternative_id.clone(), i.cost))
        .collect();
    info!(
        "optimize_budget_binary: selected {:?}, cost {} of {}, utility {}",
        selected, total_cost, budget, total_utility
    );
    Ok(Selection {
        budget,
        selected,
        total_cost,
        total_utility,
        budget_utilization: budget_utilization(total_cost, budget),
        insights: item_insights(items, &allocations),
    })
}

// ***** Continuous allocation *****

/// Splits the budget across items, funding the most efficient items first.
///
/// The minimum of every item is funded before anything else. The rest of the
/// budget goes to the items by decreasing utility per cost (ties by id), each
/// up to its maximum. For a single budget constraint this greedy fill is the
/// optimum of the linear relaxation.
pub fn optimize_budget_continuous(
    items: &[BudgetItem],
    budget: f64,
    bounds: &BTreeMap<String, AllocationBounds>,
) -> AhpResult<Allocation> {
    let by_id = check_items(items, budget)?;
    for id in bounds.keys() {
        ensure!(
            by_id.contains_key(id.as_str()),
            UnknownElementSnafu { id: id.as_str() }
        );
    }

    let mut limits: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for item in by_id.values() {
        let b = bounds.get(&item.alternative_id);
        let min = b.map(|b| b.min).unwrap_or(0.0);
        let max = b.and_then(|b| b.max).unwrap_or(item.cost);
        ensure!(
            min.is_finite() && min >= 0.0 && max.is_finite(),
            InvalidInputSnafu {
                reason: format!("item {} has invalid bounds", item.alternative_id)
            }
        );
        ensure!(
            min <= max,
            InvalidInputSnafu {
                reason: format!(
                    "item {} has a minimum {} above its maximum {}",
                    item.alternative_id, min, max
                )
            }
        );
        limits.insert(item.alternative_id.clone(), (min, max));
    }

    let required: f64 = limits.values().map(|(min, _)| min).sum();
    ensure!(
        required <= budget + TIE_EPSILON,
        InfeasibleBudgetSnafu { required, budget }
    );

    let mut allocations: BTreeMap<String, f64> = limits
        .iter()
        .map(|(id, (min, _))| (id.clone(), *min))
        .collect();
    let mut remaining = (budget - required).max(0.0);

    let mut order: Vec<&BudgetItem> = by_id.values().cloned().collect();
    order.sort_by(|a, b| efficiency_order(a, b));
    for item in order.iter() {
        if remaining <= 0.0 {
            break;
        }
        let (min, max) = limits[&item.alternative_id];
        let extra = (max - min).min(remaining);
        if extra > 0.0 {
            if let Some(a) = allocations.get_mut(&item.alternative_id) {
                *a += extra;
            }
            remaining -= extra;
        }
    }

    let total_allocated: f64 = allocations.values().sum();
    let objective: f64 = by_id
        .values()
        .map(|i| match i.efficiency() {
            Some(e) => e * allocations.get(&i.alternative_id).cloned().unwrap_or(0.0),
            None => i.utility,
        })
        .sum();
    info!(
        "optimize_budget_continuous: allocated {} of {}, objective {}",
        total_allocated, budget, objective
    );
    Ok(Allocation {
        budget,
        total_allocated,
        objective,
        budget_utilization: budget_utilization(total_allocated, budget),
        insights: item_insights(items, &allocations),
        allocations,
    })
}

// ***** Scenarios *****

/// `steps` evenly spaced budgets from `from` to `to`.
pub fn budget_levels(from: f64, to: f64, steps: usize) -> AhpResult<Vec<f64>> {
    ensure!(
        steps >= 2,
        InvalidInputSnafu {
            reason: format!("at least 2 budget levels are needed, got {}", steps)
        }
    );
    ensure!(
        from.is_finite() && to.is_finite() && from >= 0.0 && to >= 0.0,
        InvalidInputSnafu {
            reason: format!("budget levels {} and {} must be non-negative", from, to)
        }
    );
    let step = (to - from) / (steps - 1) as f64;
    Ok((0..steps)
        .map(|k| if k + 1 == steps { to } else { from + step * k as f64 })
        .collect())
}

/// Runs the binary optimizer once per budget.
pub fn budget_scenarios(
    items: &[BudgetItem],
    budgets: &[f64],
    constraints: &SelectionConstraints,
) -> AhpResult<Vec<Selection>> {
    budgets
        .iter()
        .map(|b| optimize_budget_binary(items, *b, constraints))
        .collect()
}

/// Runs the continuous optimizer once per budget.
pub fn allocation_scenarios(
    items: &[BudgetItem],
    budgets: &[f64],
    bounds: &BTreeMap<String, AllocationBounds>,
) -> AhpResult<Vec<Allocation>> {
    budgets
        .iter()
        .map(|b| optimize_budget_continuous(items, *b, bounds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn items() -> Vec<BudgetItem> {
        vec![
            BudgetItem::new("a", 5.0, 10.0),
            BudgetItem::new("b", 4.0, 7.0),
            BudgetItem::new("c", 3.0, 5.0),
            BudgetItem::new("d", 2.0, 3.0),
        ]
    }

    fn ids(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn classic_knapsack() {
        init_logger();
        let s = optimize_budget_binary(&items(), 9.0, &SelectionConstraints::default()).unwrap();
        assert_eq!(s.selected, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(s.total_utility, 17.0);
        assert_eq!(s.total_cost, 9.0);
        assert_eq!(s.budget_utilization, 1.0);
    }

    #[test]
    fn ties_prefer_lower_cost_then_smaller_ids() {
        let twins = vec![BudgetItem::new("b", 2.0, 5.0), BudgetItem::new("a", 2.0, 5.0)];
        let s = optimize_budget_binary(&twins, 2.0, &SelectionConstraints::default()).unwrap();
        assert_eq!(s.selected, vec!["a".to_string()]);

        let cheaper = vec![BudgetItem::new("a", 3.0, 5.0), BudgetItem::new("b", 2.0, 5.0)];
        let s = optimize_budget_binary(&cheaper, 3.0, &SelectionConstraints::default()).unwrap();
        assert_eq!(s.selected, vec!["b".to_string()]);
    }

    #[test]
    fn mandatory_and_excluded() {
        let constraints = SelectionConstraints {
            mandatory: ids(&["c"]),
            ..Default::default()
        };
        let s = optimize_budget_binary(&items(), 9.0, &constraints).unwrap();
        // a (5) and b + d (6) bring the same utility: the cheaper wins.
        assert_eq!(s.selected, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(s.total_utility, 15.0);

        let constraints = SelectionConstraints {
            excluded: ids(&["a"]),
            ..Default::default()
        };
        let s = optimize_budget_binary(&items(), 9.0, &constraints).unwrap();
        assert_eq!(s.total_utility, 15.0);
        assert!(!s.selected.contains(&"a".to_string()));
    }

    #[test]
    fn constraint_errors() {
        let too_much = SelectionConstraints {
            mandatory: ids(&["a", "b"]),
            ..Default::default()
        };
        assert_eq!(
            optimize_budget_binary(&items(), 8.0, &too_much),
            Err(AhpError::InfeasibleBudget {
                required: 9.0,
                budget: 8.0
            })
        );
        let conflict = SelectionConstraints {
            mandatory: ids(&["a"]),
            excluded: ids(&["a"]),
            ..Default::default()
        };
        assert!(matches!(
            optimize_budget_binary(&items(), 8.0, &conflict),
            Err(AhpError::InvalidInput { .. })
        ));
        let unknown = SelectionConstraints {
            excluded: ids(&["z"]),
            ..Default::default()
        };
        assert!(matches!(
            optimize_budget_binary(&items(), 8.0, &unknown),
            Err(AhpError::UnknownElement { .. })
        ));
        assert!(matches!(
            optimize_budget_binary(&items(), -1.0, &SelectionConstraints::default()),
            Err(AhpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn zero_budget() {
        let s = optimize_budget_binary(&items(), 0.0, &SelectionConstraints::default()).unwrap();
        assert!(s.selected.is_empty());
        assert_eq!(s.total_utility, 0.0);
        assert_eq!(s.budget_utilization, 0.0);

        let a = optimize_budget_continuous(&items(), 0.0, &BTreeMap::new()).unwrap();
        assert!(a.allocations.values().all(|v| *v == 0.0));
        assert_eq!(a.objective, 0.0);
    }

    #[test]
    fn fractional_costs() {
        let items = vec![
            BudgetItem::new("a", 0.5, 1.0),
            BudgetItem::new("b", 0.7, 1.5),
            BudgetItem::new("c", 0.4, 0.9),
        ];
        let s = optimize_budget_binary(&items, 1.25, &SelectionConstraints::default()).unwrap();
        assert_eq!(s.selected, vec!["a".to_string(), "b".to_string()]);
        assert!(s.total_cost <= 1.25);
    }

    #[test]
    fn binary_insights() {
        let s = optimize_budget_binary(&items(), 9.0, &SelectionConstraints::default()).unwrap();
        let first = &s.insights[0];
        // a: 2.0, b: 1.75, c: 1.67, d: 1.5
        assert_eq!(first.alternative_id, "a");
        assert_eq!(first.efficiency_rank, 1);
        assert_eq!(first.utilization, Some(1.0));
        let last = &s.insights[3];
        assert_eq!(last.alternative_id, "d");
        assert_eq!(last.allocation, 0.0);
    }

    fn continuous_items() -> Vec<BudgetItem> {
        vec![
            BudgetItem::new("a", 10.0, 6.0),
            BudgetItem::new("b", 20.0, 8.0),
            BudgetItem::new("c", 5.0, 5.0),
        ]
    }

    #[test]
    fn greedy_allocation() {
        let a = optimize_budget_continuous(&continuous_items(), 25.0, &BTreeMap::new()).unwrap();
        assert_eq!(a.allocations["c"], 5.0);
        assert_eq!(a.allocations["a"], 10.0);
        assert_eq!(a.allocations["b"], 10.0);
        assert!((a.objective - 15.0).abs() < 1e-12);
        assert_eq!(a.budget_utilization, 1.0);
        let b = a.insights.iter().find(|i| i.alternative_id == "b").unwrap();
        assert_eq!(b.utilization, Some(0.5));
        assert_eq!(b.efficiency_rank, 3);
    }

    #[test]
    fn minimums_are_funded_first() {
        let bounds: BTreeMap<String, AllocationBounds> = [(
            "b".to_string(),
            AllocationBounds {
                min: 15.0,
                max: None,
            },
        )]
        .into_iter()
        .collect();
        let a = optimize_budget_continuous(&continuous_items(), 25.0, &bounds).unwrap();
        assert_eq!(a.allocations["b"], 15.0);
        assert_eq!(a.allocations["c"], 5.0);
        assert_eq!(a.allocations["a"], 5.0);
        assert!((a.objective - 14.0).abs() < 1e-12);

        assert!(matches!(
            optimize_budget_continuous(&continuous_items(), 10.0, &bounds),
            Err(AhpError::InfeasibleBudget { .. })
        ));
        let inverted: BTreeMap<String, AllocationBounds> = [(
            "a".to_string(),
            AllocationBounds {
                min: 5.0,
                max: Some(2.0),
            },
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            optimize_budget_continuous(&continuous_items(), 25.0, &inverted),
            Err(AhpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn scenarios() {
        let levels = budget_levels(0.0, 9.0, 4).unwrap();
        assert_eq!(levels, vec![0.0, 3.0, 6.0, 9.0]);
        let runs = budget_scenarios(&items(), &levels, &SelectionConstraints::default()).unwrap();
        let utilities: Vec<f64> = runs.iter().map(|s| s.total_utility).collect();
        assert_eq!(utilities, vec![0.0, 5.0, 10.0, 17.0]);
        let allocations = allocation_scenarios(&items(), &levels, &BTreeMap::new()).unwrap();
        assert!(allocations
            .windows(2)
            .all(|w| w[0].objective <= w[1].objective));
        assert!(budget_levels(0.0, 1.0, 1).is_err());
    }

    #[test]
    fn fractional_costs_can_fill_the_budget() {
        let items = vec![
            BudgetItem::new("i0", 1.596, 0.528),
            BudgetItem::new("i1", 3.799, 0.771),
            BudgetItem::new("i3", 6.602, 0.708),
            BudgetItem::new("i4", 2.865, 0.452),
        ];
        let s = optimize_budget_binary(&items, 14.8629, &SelectionConstraints::default()).unwrap();
        assert_eq!(s.selected, vec!["i0", "i1", "i3", "i4"]);
        assert!((s.total_utility - 2.459).abs() < 1e-9);
    }

    #[test]
    fn many_fractional_items_use_buckets_then_fill() {
        let items: Vec<BudgetItem> = (0..40)
            .map(|k| BudgetItem::new(format!("i{:02}", k), 0.3, 1.0))
            .collect();
        let constraints = SelectionConstraints {
            max_buckets: 7,
            ..Default::default()
        };
        let s = optimize_budget_binary(&items, 6.0, &constraints).unwrap();
        assert_eq!(s.selected.len(), 20);
        assert!(s.total_cost <= 6.0 + 1e-9);
    }

    #[test]
    fn free_items_count_their_full_utility() {
        let items = vec![
            BudgetItem::new("free", 0.0, 2.0),
            BudgetItem::new("paid", 10.0, 5.0),
        ];
        let a = optimize_budget_continuous(&items, 4.0, &BTreeMap::new()).unwrap();
        assert_eq!(a.allocations["free"], 0.0);
        assert_eq!(a.allocations["paid"], 4.0);
        assert!((a.objective - 4.0).abs() < 1e-12);
        let free = a.insights.iter().find(|i| i.alternative_id == "free").unwrap();
        assert_eq!(free.efficiency, None);
        assert_eq!(free.efficiency_rank, 1);
        assert_eq!(free.utilization, None);
    }

    // Exhaustive search over every subset, for small inputs.
    fn best_utility(items: &[BudgetItem], budget: f64) -> f64 {
        let mut best: f64 = 0.0;
        for mask in 0u32..(1 << items.len()) {
            let (cost, utility) = items
                .iter()
                .enumerate()
                .filter(|(k, _)| mask & (1 << k) != 0)
                .fold((0.0, 0.0), |(c, u), (_, i)| (c + i.cost, u + i.utility));
            if cost <= budget + 1e-9 {
                best = best.max(utility);
            }
        }
        best
    }

    proptest! {
        #[test]
        fn fractional_selection_is_optimal(
            raw in proptest::collection::vec((0.01f64..10.0, 0.0f64..1.0), 1..8),
            budget in 0.0f64..30.0,
        ) {
            let items: Vec<BudgetItem> = raw
                .iter()
                .enumerate()
                .map(|(k, (c, u))| BudgetItem::new(format!("i{}", k), *c, *u))
                .collect();
            let s = optimize_budget_binary(&items, budget, &SelectionConstraints::default()).unwrap();
            prop_assert!(s.total_cost <= budget + 1e-9);
            prop_assert!(s.total_utility >= best_utility(&items, budget) - 1e-6);
        }

        #[test]
        fn binary_selection_is_feasible(
            raw in proptest::collection::vec((0.0f64..50.0, 0.0f64..10.0), 1..8),
            budget in 0.0f64..100.0,
        ) {
            let items: Vec<BudgetItem> = raw
                .iter()
                .enumerate()
                .map(|(k, (c, u))| BudgetItem::new(format!("i{}", k), *c, *u))
                .collect();
            let s = optimize_budget_binary(&items, budget, &SelectionConstraints::default()).unwrap();
            prop_assert!(s.total_cost <= budget + 1e-9);
            let again = optimize_budget_binary(&items, budget, &SelectionConstraints::default()).unwrap();
            prop_assert_eq!(s, again);
        }
    }
}
