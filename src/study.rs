use log::{debug, info, warn};

use ahp_engine::*;
use snafu::prelude::*;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::study::config_reader::*;

pub mod config_reader;
pub mod io_csv;

// Correction suggestions reported per unacceptable matrix, unless configured.
const DEFAULT_MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StudyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Line {lineno}: {value} is not a number"))]
    CsvNumber { lineno: usize, value: String },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The study file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("{what}: {source}"))]
    Engine { source: AhpError, what: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type StudyResult<T> = Result<T, StudyError>;

// ***** Rules *****

fn parse_mode(s: &str) -> StudyResult<AggregationMode> {
    match s {
        "distributive" => Ok(AggregationMode::Distributive),
        "ideal" => Ok(AggregationMode::Ideal),
        x => whatever!("Unknown aggregation mode {:?}", x),
    }
}

fn mode_name(mode: AggregationMode) -> &'static str {
    match mode {
        AggregationMode::Distributive => "distributive",
        AggregationMode::Ideal => "ideal",
    }
}

fn policy_name(policy: GroupPolicy) -> &'static str {
    match policy {
        GroupPolicy::Equal => "equal",
        GroupPolicy::ExplicitWeight => "explicitWeight",
        GroupPolicy::ConsistencyWeighted => "consistencyWeighted",
    }
}

fn method_name(method: PriorityMethod) -> &'static str {
    match method {
        PriorityMethod::GeometricMean => "geometricMean",
        PriorityMethod::PowerIteration => "powerIteration",
    }
}

fn impact_name(impact: Impact) -> &'static str {
    match impact {
        Impact::High => "high",
        Impact::Medium => "medium",
        Impact::Low => "low",
    }
}

/// Maps the options of the study file onto the engine rules. The mode given on
/// the command line takes precedence over the one of the file.
pub fn validate_rules(rules: &StudyRules, mode_override: &Option<String>) -> StudyResult<EngineRules> {
    let mut res = EngineRules::DEFAULT_RULES;
    if let Some(m) = &rules.priority_method {
        res.priority_method = match m.as_str() {
            "geometricMean" => PriorityMethod::GeometricMean,
            "powerIteration" => PriorityMethod::PowerIteration,
            x => whatever!("Unknown priority method {:?}", x),
        };
    }
    if let Some(x) = rules.consistency_threshold {
        if !(x.is_finite() && x >= 0.0) {
            whatever!("Cannot use consistency threshold {}", x)
        }
        res.consistency_threshold = x;
    }
    if let Some(m) = mode_override.as_ref().or(rules.aggregation_mode.as_ref()) {
        res.aggregation_mode = parse_mode(m)?;
    }
    if let Some(p) = &rules.group_policy {
        res.group_policy = match p.as_str() {
            "equal" => GroupPolicy::Equal,
            "explicitWeight" => GroupPolicy::ExplicitWeight,
            "consistencyWeighted" => GroupPolicy::ConsistencyWeighted,
            x => whatever!("Unknown group policy {:?}", x),
        };
    }
    if let Some(x) = rules.consistency_weight_floor {
        if !(x.is_finite() && x > 0.0) {
            whatever!("The consistency weight floor must be positive, got {}", x)
        }
        res.consistency_weighting = ConsistencyWeighting { floor: x };
    }
    let high = rules.impact_high.unwrap_or(res.impact_thresholds.high);
    let medium = rules.impact_medium.unwrap_or(res.impact_thresholds.medium);
    if !(medium >= 0.0 && medium <= high) {
        whatever!("Impact thresholds must satisfy 0 <= medium <= high, got {} and {}", medium, high)
    }
    res.impact_thresholds = ImpactThresholds { high, medium };
    if let Some(b) = rules.require_complete_matrices {
        res.require_complete_matrices = b;
    }
    if let Some(x) = rules.max_buckets {
        if x == 0 {
            whatever!("maxBuckets must be positive")
        }
        res.max_buckets = x;
    }
    debug!("validate_rules: {:?}", res);
    Ok(res)
}

// ***** Evaluators *****

struct MatrixReport {
    node: String,
    labels: Vec<String>,
    evaluation: MatrixEvaluation,
}

struct EvaluatorOutcome {
    contribution: EvaluatorContribution,
    matrices: Vec<MatrixReport>,
    non_discriminating: Vec<String>,
    synthesis: Synthesis,
    // Per leaf criterion, the scores after normalization for the mode.
    normalized: BTreeMap<String, Vec<f64>>,
}

fn build_hierarchy(config: &StudyConfig) -> StudyResult<Hierarchy> {
    let mut levels: BTreeMap<String, u32> = BTreeMap::new();
    let mut criteria: Vec<Element> = Vec::new();
    for c in config.criteria.iter() {
        if c.id == "goal" {
            whatever!("The criterion id goal is reserved for the top of the hierarchy");
        }
        let level = match &c.parent_id {
            None => 1,
            Some(p) => match levels.get(p) {
                Some(l) => l + 1,
                None => whatever!(
                    "Criterion {} must be declared after its parent {}",
                    c.id,
                    p
                ),
            },
        };
        levels.insert(c.id.clone(), level);
        criteria.push(Element {
            id: c.id.clone(),
            name: c.name.clone(),
            level,
            parent_id: c.parent_id.clone(),
        });
    }
    let alternatives: Vec<Alternative> = config
        .alternatives
        .iter()
        .map(|a| Alternative {
            id: a.id.clone(),
            name: a.name.clone(),
        })
        .collect();
    Hierarchy::new(criteria, alternatives).context(EngineSnafu {
        what: "Invalid criteria tree",
    })
}

fn node_matrix(
    ev: &StudyEvaluator,
    node: &str,
    n: usize,
    rules: &EngineRules,
) -> StudyResult<Option<ComparisonMatrix>> {
    let blocks: Vec<&StudyComparison> = ev.comparisons.iter().filter(|c| c.node == node).collect();
    let block = match blocks.as_slice() {
        [] => return Ok(None),
        [b] => b,
        _ => whatever!("Evaluator {} compares node {} more than once", ev.id, node),
    };
    let what = format!("Evaluator {}, node {}", ev.id, node);
    let res = if rules.require_complete_matrices {
        build_complete_matrix(n, &block.judgments)
    } else {
        let missing = missing_judgments(n, &block.judgments);
        if !missing.is_empty() {
            warn!(
                "Evaluator {} node {}: cells {:?} are not judged and count as equal",
                ev.id, node, missing
            );
        }
        build_matrix(n, &block.judgments)
    };
    let m = res.context(EngineSnafu { what })?;
    Ok(Some(m))
}

fn evaluate_node(
    ev: &StudyEvaluator,
    node: &str,
    labels: Vec<String>,
    rules: &EngineRules,
    max_suggestions: usize,
) -> StudyResult<MatrixReport> {
    let n = labels.len();
    let m = match node_matrix(ev, node, n, rules)? {
        Some(m) => m,
        None if n == 1 => ComparisonMatrix::identity(1),
        None => whatever!("Evaluator {} has no comparisons for node {}", ev.id, node),
    };
    let evaluation = evaluate_matrix(&m, rules, max_suggestions).context(EngineSnafu {
        what: format!("Evaluator {}, node {}", ev.id, node),
    })?;
    debug!(
        "Evaluator {} node {}: priorities {:?}",
        ev.id, node, evaluation.priorities
    );
    Ok(MatrixReport {
        node: node.to_string(),
        labels,
        evaluation,
    })
}

fn check_nodes(ev: &StudyEvaluator, hierarchy: &Hierarchy) -> StudyResult<()> {
    for c in ev.comparisons.iter() {
        if c.node != "goal" && hierarchy.criterion(&c.node).is_none() {
            whatever!("Evaluator {} compares an unknown node {}", ev.id, c.node)
        }
    }
    for d in ev.direct_inputs.iter() {
        if hierarchy.criterion(&d.criterion).is_none() || !hierarchy.is_leaf(&d.criterion) {
            whatever!(
                "Evaluator {} gives direct inputs for {}, which is not a leaf criterion",
                ev.id,
                d.criterion
            )
        }
    }
    Ok(())
}

fn evaluate_evaluator(
    ev: &StudyEvaluator,
    hierarchy: &Hierarchy,
    rules: &EngineRules,
    max_suggestions: usize,
) -> StudyResult<EvaluatorOutcome> {
    info!("Evaluating {}", ev.id);
    check_nodes(ev, hierarchy)?;
    let alternative_ids = hierarchy.alternative_ids();
    let mut matrices: Vec<MatrixReport> = Vec::new();
    let mut non_discriminating: Vec<String> = Vec::new();
    let mut leaf_scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut by_criterion: BTreeMap<String, PriorityVector> = BTreeMap::new();

    let top: Vec<String> = hierarchy.children(None).iter().map(|c| c.id.clone()).collect();
    let goal = evaluate_node(ev, "goal", top, rules, max_suggestions)?;
    let goal_priorities = goal.evaluation.priorities.clone();
    matrices.push(goal);

    for c in hierarchy.criteria().iter() {
        let children: Vec<String> = hierarchy
            .children(Some(c.id.as_str()))
            .iter()
            .map(|e| e.id.clone())
            .collect();
        if !children.is_empty() {
            let report = evaluate_node(ev, &c.id, children, rules, max_suggestions)?;
            by_criterion.insert(c.id.clone(), report.evaluation.priorities.clone());
            matrices.push(report);
            continue;
        }
        let direct = ev.direct_inputs.iter().find(|d| d.criterion == c.id);
        let compared = ev.comparisons.iter().any(|cmp| cmp.node == c.id);
        let scores = match (direct, compared) {
            (Some(_), true) => whatever!(
                "Evaluator {} both compares and measures criterion {}",
                ev.id,
                c.id
            ),
            (Some(d), false) => {
                let s = normalize_direct_input(&d.values, d.is_benefit).context(EngineSnafu {
                    what: format!("Evaluator {}, criterion {}", ev.id, c.id),
                })?;
                if s.non_discriminating {
                    non_discriminating.push(c.id.clone());
                }
                s.scores
            }
            (None, _) => {
                let report =
                    evaluate_node(ev, &c.id, alternative_ids.clone(), rules, max_suggestions)?;
                let s = report.evaluation.priorities.weights().to_vec();
                matrices.push(report);
                s
            }
        };
        leaf_scores.insert(c.id.clone(), scores);
    }

    let local = LocalPriorities {
        goal: goal_priorities,
        by_criterion,
    };
    let what = format!("Evaluator {}", ev.id);
    let synthesis = synthesize(hierarchy, &local, &leaf_scores, rules.aggregation_mode)
        .context(EngineSnafu { what: what.clone() })?;
    let mut normalized: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (leaf, scores) in leaf_scores.iter() {
        let n = normalize_scores(scores, rules.aggregation_mode)
            .context(EngineSnafu { what: what.clone() })?;
        normalized.insert(leaf.clone(), n);
    }
    let worst_consistency_ratio = matrices
        .iter()
        .map(|m| m.evaluation.consistency.cr)
        .fold(0.0, f64::max);
    let mut contribution = EvaluatorContribution::new(ev.id.clone(), synthesis.scores.clone());
    contribution.weight = ev.weight.unwrap_or(1.0);
    contribution.include_in_group = ev.include_in_group.unwrap_or(true);
    contribution.worst_consistency_ratio = worst_consistency_ratio;
    Ok(EvaluatorOutcome {
        contribution,
        matrices,
        non_discriminating,
        synthesis,
        normalized,
    })
}

// The group as one synthesis model: leaf weights are the weighted means of
// the evaluators' leaf weights, and leaf scores are the means of the
// normalized scores weighted by what each evaluator gave to the leaf. In
// distributive mode the model reproduces the group scores exactly.
fn group_sensitivity_input(
    outcomes: &[EvaluatorOutcome],
    group: &GroupResult,
    hierarchy: &Hierarchy,
    mode: AggregationMode,
) -> SensitivityInput {
    let n_alts = hierarchy.alternatives().len();
    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    let mut weighted: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut plain: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for o in outcomes.iter() {
        let w_e = match group.effective_weights.get(&o.contribution.evaluator_id) {
            Some(w) => *w,
            None => continue,
        };
        for (leaf, scores) in o.normalized.iter() {
            let w_c = o.synthesis.criterion_weights.get(leaf).cloned().unwrap_or(0.0);
            *weights.entry(leaf.clone()).or_insert(0.0) += w_e * w_c;
            let acc = weighted.entry(leaf.clone()).or_insert_with(|| vec![0.0; n_alts]);
            let acc_plain = plain.entry(leaf.clone()).or_insert_with(|| vec![0.0; n_alts]);
            for (k, s) in scores.iter().enumerate() {
                acc[k] += w_e * w_c * s;
                acc_plain[k] += w_e * s;
            }
        }
    }
    let leaf_scores: BTreeMap<String, Vec<f64>> = weighted
        .into_iter()
        .map(|(leaf, acc)| {
            let w = weights.get(&leaf).cloned().unwrap_or(0.0);
            let scores = if w > 0.0 {
                acc.iter().map(|v| v / w).collect()
            } else {
                plain.get(&leaf).cloned().unwrap_or_default()
            };
            (leaf, scores)
        })
        .collect();
    SensitivityInput {
        leaf_weights: weights,
        leaf_scores,
        alternatives: hierarchy.alternative_ids(),
        mode,
    }
}

// ***** Summary *****

fn fmt(x: f64) -> JSValue {
    json!(format!("{:.4}", x))
}

fn scores_js(scores: &BTreeMap<String, f64>) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    for (id, s) in scores.iter() {
        m.insert(id.clone(), fmt(*s));
    }
    JSValue::Object(m)
}

fn ranking_js(ranking: &[RankedAlternative]) -> JSValue {
    JSValue::Array(
        ranking
            .iter()
            .map(|r| json!({"rank": r.rank, "alternative": r.alternative_id, "score": fmt(r.score)}))
            .collect(),
    )
}

fn matrix_js(report: &MatrixReport) -> JSValue {
    let mut priorities: JSMap<String, JSValue> = JSMap::new();
    for (label, w) in report
        .labels
        .iter()
        .zip(report.evaluation.priorities.weights().iter())
    {
        priorities.insert(label.clone(), fmt(*w));
    }
    let suggestions: Vec<JSValue> = report
        .evaluation
        .suggestions
        .iter()
        .map(|s| {
            json!({
                "row": report.labels[s.i],
                "column": report.labels[s.j],
                "currentValue": fmt(s.current_value),
                "recommendedValue": fmt(s.recommended_value),
            })
        })
        .collect();
    let c = &report.evaluation.consistency;
    json!({
        "node": report.node,
        "priorities": priorities,
        "consistencyRatio": fmt(c.cr),
        "acceptable": c.is_acceptable,
        "suggestions": suggestions,
    })
}

fn evaluator_js(o: &EvaluatorOutcome) -> JSValue {
    json!({
        "id": o.contribution.evaluator_id,
        "included": o.contribution.include_in_group,
        "worstConsistencyRatio": fmt(o.contribution.worst_consistency_ratio),
        "matrices": o.matrices.iter().map(matrix_js).collect::<Vec<JSValue>>(),
        "nonDiscriminating": o.non_discriminating,
        "criterionWeights": scores_js(&o.synthesis.criterion_weights),
        "ranking": ranking_js(&o.synthesis.ranking),
    })
}

fn sensitivity_js(r: &SensitivityReport) -> JSValue {
    let points: Vec<JSValue> = r
        .points
        .iter()
        .map(|p| {
            json!({
                "delta": fmt(p.delta),
                "weight": fmt(p.target_weight),
                "scores": scores_js(&p.scores),
                "ranks": p.ranks,
            })
        })
        .collect();
    json!({
        "criterion": r.criterion,
        "weight": fmt(r.baseline_weight),
        "impact": impact_name(r.impact),
        "maxSwing": fmt(r.max_swing),
        "rankReversal": r.rank_reversal,
        "points": points,
    })
}

fn insights_js(insights: &[ItemInsight]) -> JSValue {
    JSValue::Array(
        insights
            .iter()
            .map(|i| {
                json!({
                    "alternative": i.alternative_id,
                    "efficiencyRank": i.efficiency_rank,
                    "allocation": fmt(i.allocation),
                    "utilization": i.utilization.map(fmt),
                })
            })
            .collect(),
    )
}

fn selection_js(s: &Selection) -> JSValue {
    json!({
        "budget": fmt(s.budget),
        "selected": s.selected,
        "totalCost": fmt(s.total_cost),
        "totalUtility": fmt(s.total_utility),
        "budgetUtilization": fmt(s.budget_utilization),
        "items": insights_js(&s.insights),
    })
}

fn allocation_js(a: &Allocation) -> JSValue {
    json!({
        "budget": fmt(a.budget),
        "allocations": scores_js(&a.allocations),
        "objective": fmt(a.objective),
        "budgetUtilization": fmt(a.budget_utilization),
        "items": insights_js(&a.insights),
    })
}

// ***** Budget *****

fn budget_items(
    budget: &StudyBudget,
    study_dir: &Path,
    hierarchy: &Hierarchy,
    utilities: &GlobalPriorityMap,
) -> StudyResult<Vec<BudgetItem>> {
    let costs: BTreeMap<String, f64> = match (&budget.costs, &budget.costs_file) {
        (Some(c), None) => c.clone(),
        (None, Some(f)) => {
            let p: PathBuf = study_dir.join(f);
            io_csv::read_costs_csv(p.display().to_string().as_str())?
        }
        _ => whatever!("The budget needs exactly one of costs or costsFile"),
    };
    for id in costs.keys() {
        if !utilities.contains_key(id) {
            whatever!("Cost given for an unknown alternative {}", id)
        }
    }
    let mut items = Vec::new();
    for a in hierarchy.alternatives().iter() {
        let cost = match costs.get(&a.id) {
            Some(c) => *c,
            None => whatever!("Missing cost for alternative {}", a.id),
        };
        let utility = utilities.get(&a.id).cloned().unwrap_or(0.0);
        items.push(BudgetItem::new(a.id.clone(), cost, utility));
    }
    Ok(items)
}

fn run_budget(
    budget: &StudyBudget,
    items: &[BudgetItem],
    rules: &EngineRules,
) -> StudyResult<JSValue> {
    let what = "Budget optimization";
    match budget.mode.as_str() {
        "binary" => {
            let constraints = SelectionConstraints {
                mandatory: budget.mandatory.iter().cloned().collect::<BTreeSet<String>>(),
                excluded: budget.excluded.iter().cloned().collect::<BTreeSet<String>>(),
                max_buckets: rules.max_buckets,
            };
            let s = optimize_budget_binary(items, budget.total, &constraints)
                .context(EngineSnafu { what })?;
            let scenarios = budget_scenarios(
                items,
                budget.scenarios.as_deref().unwrap_or(&[]),
                &constraints,
            )
            .context(EngineSnafu { what })?;
            Ok(json!({
                "mode": "binary",
                "solution": selection_js(&s),
                "scenarios": scenarios.iter().map(selection_js).collect::<Vec<JSValue>>(),
            }))
        }
        "continuous" => {
            let bounds: BTreeMap<String, AllocationBounds> = budget
                .bounds
                .iter()
                .flatten()
                .map(|(id, b)| {
                    (
                        id.clone(),
                        AllocationBounds {
                            min: b.min.unwrap_or(0.0),
                            max: b.max,
                        },
                    )
                })
                .collect();
            let a = optimize_budget_continuous(items, budget.total, &bounds)
                .context(EngineSnafu { what })?;
            let scenarios = allocation_scenarios(
                items,
                budget.scenarios.as_deref().unwrap_or(&[]),
                &bounds,
            )
            .context(EngineSnafu { what })?;
            Ok(json!({
                "mode": "continuous",
                "solution": allocation_js(&a),
                "scenarios": scenarios.iter().map(allocation_js).collect::<Vec<JSValue>>(),
            }))
        }
        x => whatever!("Unknown budget mode {:?}", x),
    }
}

// ***** Study *****

/// Runs every analysis of a study and assembles the JSON summary.
pub fn evaluate_study(
    config: &StudyConfig,
    study_dir: &Path,
    rules: &EngineRules,
) -> StudyResult<JSValue> {
    let hierarchy = build_hierarchy(config)?;
    if config.evaluators.is_empty() {
        whatever!("The study has no evaluators")
    }
    let max_suggestions = config
        .rules
        .max_suggestions
        .unwrap_or(DEFAULT_MAX_SUGGESTIONS);

    let mut outcomes: Vec<EvaluatorOutcome> = Vec::new();
    for ev in config.evaluators.iter() {
        outcomes.push(evaluate_evaluator(ev, &hierarchy, rules, max_suggestions)?);
    }
    let contributions: Vec<EvaluatorContribution> =
        outcomes.iter().map(|o| o.contribution.clone()).collect();
    let group = aggregate_group_with(
        &contributions,
        rules.group_policy,
        &rules.consistency_weighting,
    )
    .context(EngineSnafu {
        what: "Group aggregation",
    })?;
    info!("Group fingerprint: {}", group.fingerprint);
    let group_ranking = rank_alternatives(&group.scores);

    let mut summary: JSMap<String, JSValue> = JSMap::new();
    summary.insert(
        "config".to_string(),
        json!({
            "studyName": config.output_settings.study_name,
            "priorityMethod": method_name(rules.priority_method),
            "aggregationMode": mode_name(rules.aggregation_mode),
            "groupPolicy": policy_name(rules.group_policy),
        }),
    );
    summary.insert(
        "evaluators".to_string(),
        JSValue::Array(outcomes.iter().map(evaluator_js).collect()),
    );
    summary.insert(
        "group".to_string(),
        json!({
            "effectiveWeights": scores_js(&group.effective_weights),
            "excluded": group.excluded,
            "ranking": ranking_js(&group_ranking),
        }),
    );

    if let Some(s) = &config.sensitivity {
        let input = group_sensitivity_input(&outcomes, &group, &hierarchy, rules.aggregation_mode);
        debug!("Sensitivity input: {:?}", input);
        let reports = match &s.criterion {
            Some(c) => vec![run_sensitivity(
                &input,
                c,
                &Perturbation::Deltas(s.deltas.clone()),
                &rules.impact_thresholds,
            )
            .context(EngineSnafu {
                what: "Sensitivity analysis",
            })?],
            None => analyze_all_criteria(&input, &s.deltas, &rules.impact_thresholds).context(
                EngineSnafu {
                    what: "Sensitivity analysis",
                },
            )?,
        };
        summary.insert(
            "sensitivity".to_string(),
            JSValue::Array(reports.iter().map(sensitivity_js).collect()),
        );
    }

    if let Some(b) = &config.budget {
        let items = budget_items(b, study_dir, &hierarchy, &group.scores)?;
        summary.insert("budget".to_string(), run_budget(b, &items, rules)?);
    }

    Ok(JSValue::Object(summary))
}

fn write_summary(
    config: &StudyConfig,
    study_dir: &Path,
    out: &Option<String>,
    pretty: &str,
) -> StudyResult<()> {
    let target: Option<PathBuf> = match out.as_deref() {
        Some("stdout") => None,
        Some(p) => Some(PathBuf::from(p)),
        None => config.output_settings.output_directory.as_ref().map(|d| {
            study_dir
                .join(d)
                .join(format!("{}_summary.json", config.output_settings.study_name))
        }),
    };
    match target {
        None => println!("{}", pretty),
        Some(p) => {
            let path = p.display().to_string();
            info!("Writing summary to {:?}", path);
            fs::write(&p, pretty).context(WritingSummarySnafu { path })?;
        }
    }
    Ok(())
}

/// Reads a study file, runs it and writes its summary. When a reference
/// summary is given, any difference with it is printed and fails the run.
pub fn run_study(
    config_path: String,
    out: Option<String>,
    check_summary_path: Option<String>,
    mode: Option<String>,
) -> StudyResult<JSValue> {
    let config = read_study(config_path.as_str())?;
    info!("config: {:?}", config.output_settings);
    let rules = validate_rules(&config.rules, &mode)?;
    let study_dir = Path::new(config_path.as_str())
        .parent()
        .context(MissingParentDirSnafu {})?;

    let summary = evaluate_study(&config, study_dir, &rules)?;
    let pretty_js_stats = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    write_summary(&config, study_dir, &out, &pretty_js_stats)?;

    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p.as_str())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(summary)
}
