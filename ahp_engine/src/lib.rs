/*!
Computation engine for the Analytic Hierarchy Process (AHP).

The engine turns the pairwise judgments of one or more evaluators into
priorities, checks how consistent those judgments are, synthesizes them over
a hierarchy of criteria, and supports the analyses that follow a decision:
how sensitive the ranking is to the weights, and which alternatives to fund
under a budget.

All the functions are pure and deterministic: they only read their inputs,
and the same inputs always produce the same outputs.

```
use ahp_engine::*;

// Cost is 3 times as important as comfort.
let m = build_matrix(2, &[Judgment::new(0, 1, 3.0)])?;
let evaluation = evaluate_matrix(&m, &EngineRules::DEFAULT_RULES, 3)?;
assert!((evaluation.priorities.weights()[0] - 0.75).abs() < 1e-12);
assert!(evaluation.consistency.is_acceptable);
# Ok::<(), AhpError>(())
```

See the [manual] for the format of the study files read by `ahpcalc`.
*/

mod config;

pub mod budget;
pub mod builder;
pub mod consistency;
pub mod direct_input;
pub mod group;
pub mod hierarchy;
pub mod manual;
pub mod matrix;
pub mod priority;
pub mod sensitivity;

pub use crate::config::*;

pub use crate::budget::{
    allocation_scenarios, budget_levels, budget_scenarios, item_insights,
    optimize_budget_binary, optimize_budget_continuous, Allocation, AllocationBounds, BudgetItem,
    ItemInsight, Selection, SelectionConstraints,
};
pub use crate::consistency::{
    check_consistency, check_consistency_with, evaluate_matrix, random_index,
    suggest_corrections, ConsistencyResult, CorrectionSuggestion, MatrixEvaluation,
};
pub use crate::direct_input::{normalize_direct_input, DirectInputScores};
pub use crate::group::{
    aggregate_group, aggregate_group_with, aggregate_judgments, EvaluatorContribution,
    GroupResult,
};
pub use crate::hierarchy::{
    aggregate_hierarchy, combine_scores, global_weights, leaf_weights, normalize_scores,
    rank_alternatives, synthesize, Alternative, Element, GlobalPriorityMap, Hierarchy,
    LocalPriorities, RankedAlternative, Synthesis,
};
pub use crate::matrix::{
    build_complete_matrix, build_matrix, missing_judgments, nearest_scale_value, scale_value,
    ComparisonMatrix, Judgment, SAATY_SCALE,
};
pub use crate::priority::{
    compute_priority, estimate_priority, power_iteration, EigenEstimate, PriorityVector,
};
pub use crate::sensitivity::{
    analyze_all_criteria, rescale_weights, run_paired_sensitivity, run_sensitivity, Impact,
    Perturbation, SensitivityInput, SensitivityPoint, SensitivityReport,
};
