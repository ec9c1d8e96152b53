// ********* Errors ***********

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Errors that prevent a computation from completing.
///
/// Degenerate-but-valid situations (a consistency ratio for fewer than three
/// elements, direct inputs that are all identical) are not errors: they are
/// reported in the regular outputs.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AhpError {
    /// A comparison matrix or judgment that cannot be used: non-positive
    /// entries, values off the Saaty scale, missing required cells.
    #[snafu(display("Invalid comparison matrix: {reason}"))]
    InvalidMatrix { reason: String },

    /// A raw value the engine cannot process (for example a zero value for a
    /// cost criterion).
    #[snafu(display("Invalid input: {reason}"))]
    InvalidInput { reason: String },

    /// No evaluator is included in a group aggregation.
    #[snafu(display("No evaluator is included in the group"))]
    EmptyGroup {},

    #[snafu(display("Dimension mismatch for {what}: expected {expected}, got {actual}"))]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// The mandatory items (or the minimum allocations) alone exceed the budget.
    #[snafu(display("Infeasible budget: {required} is required but only {budget} is available"))]
    InfeasibleBudget { required: f64, budget: f64 },

    #[snafu(display("Invalid hierarchy: {reason}"))]
    InvalidHierarchy { reason: String },

    #[snafu(display("Unknown element: {id}"))]
    UnknownElement { id: String },
}

pub type AhpResult<T> = Result<T, AhpError>;

// ********* Configuration **********

/// How a priority vector is derived from a comparison matrix.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PriorityMethod {
    /// Row geometric means, normalized. Closed form and deterministic.
    GeometricMean,
    /// Principal eigenvector by power iteration.
    PowerIteration,
}

/// The two synthesis semantics for alternative scores.
///
/// - Distributive normalizes the scores under each criterion to sum to 1.
/// The totals of all the alternatives also sum to 1.
///
/// - Ideal divides the scores under each criterion by the best one. The best
/// alternative under a criterion collects the full weight of that criterion,
/// and the totals are not constrained to sum to 1.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AggregationMode {
    Distributive,
    Ideal,
}

/// How the evaluators of a group are weighted against each other.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum GroupPolicy {
    Equal,
    ExplicitWeight,
    ConsistencyWeighted,
}

/// Parameters of the consistency-weighted group policy.
///
/// An evaluator's raw weight is `1 / (worst_cr + floor)`. The floor keeps
/// perfectly consistent evaluators from getting an infinite weight.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsistencyWeighting {
    pub floor: f64,
}

impl ConsistencyWeighting {
    pub const DEFAULT: ConsistencyWeighting = ConsistencyWeighting { floor: 0.01 };
}

/// Thresholds on the maximum score swing observed during a sensitivity run.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactThresholds {
    pub high: f64,
    pub medium: f64,
}

impl ImpactThresholds {
    pub const DEFAULT: ImpactThresholds = ImpactThresholds {
        high: 0.10,
        medium: 0.05,
    };
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerIterationSettings {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl PowerIterationSettings {
    pub const DEFAULT: PowerIterationSettings = PowerIterationSettings {
        tolerance: 1e-10,
        max_iterations: 100,
    };
}

/// Saaty's conventional acceptance threshold for the consistency ratio.
pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.10;

/// Cap on the number of cost buckets of the binary knapsack.
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;

/// All the tunable policies of a study.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EngineRules {
    pub priority_method: PriorityMethod,
    pub power_iteration: PowerIterationSettings,
    pub consistency_threshold: f64,
    pub aggregation_mode: AggregationMode,
    pub group_policy: GroupPolicy,
    pub consistency_weighting: ConsistencyWeighting,
    pub impact_thresholds: ImpactThresholds,
    pub max_buckets: usize,
    /// If set, every comparison matrix must have all its upper cells judged.
    pub require_complete_matrices: bool,
}

impl EngineRules {
    pub const DEFAULT_RULES: EngineRules = EngineRules {
        priority_method: PriorityMethod::GeometricMean,
        power_iteration: PowerIterationSettings::DEFAULT,
        consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
        aggregation_mode: AggregationMode::Distributive,
        group_policy: GroupPolicy::Equal,
        consistency_weighting: ConsistencyWeighting::DEFAULT,
        impact_thresholds: ImpactThresholds::DEFAULT,
        max_buckets: DEFAULT_MAX_BUCKETS,
        require_complete_matrices: false,
    };
}

impl Default for EngineRules {
    fn default() -> Self {
        EngineRules::DEFAULT_RULES
    }
}
