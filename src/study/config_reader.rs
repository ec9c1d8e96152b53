use crate::study::*;

use ahp_engine::Judgment;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use std::collections::BTreeMap;
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "studyName")]
    pub study_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

/// The tunable policies. Every option falls back to the engine default.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyRules {
    #[serde(rename = "priorityMethod")]
    pub priority_method: Option<String>,
    #[serde(rename = "consistencyThreshold")]
    pub consistency_threshold: Option<f64>,
    #[serde(rename = "aggregationMode")]
    pub aggregation_mode: Option<String>,
    #[serde(rename = "groupPolicy")]
    pub group_policy: Option<String>,
    #[serde(rename = "consistencyWeightFloor")]
    pub consistency_weight_floor: Option<f64>,
    #[serde(rename = "impactHigh")]
    pub impact_high: Option<f64>,
    #[serde(rename = "impactMedium")]
    pub impact_medium: Option<f64>,
    #[serde(rename = "requireCompleteMatrices")]
    pub require_complete_matrices: Option<bool>,
    #[serde(rename = "maxBuckets")]
    pub max_buckets: Option<usize>,
    #[serde(rename = "maxSuggestions")]
    pub max_suggestions: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyCriterion {
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyAlternative {
    pub id: String,
    pub name: String,
}

/// The judgments of one evaluator at one node of the hierarchy.
///
/// `node` is `goal` for the top criteria, the id of a parent criterion for its
/// children, or the id of a leaf criterion for the alternatives.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyComparison {
    pub node: String,
    pub judgments: Vec<Judgment>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyDirectInput {
    pub criterion: String,
    #[serde(rename = "isBenefit")]
    pub is_benefit: bool,
    pub values: Vec<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyEvaluator {
    pub id: String,
    pub weight: Option<f64>,
    #[serde(rename = "includeInGroup")]
    pub include_in_group: Option<bool>,
    #[serde(default)]
    pub comparisons: Vec<StudyComparison>,
    #[serde(rename = "directInputs", default)]
    pub direct_inputs: Vec<StudyDirectInput>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudySensitivity {
    /// If missing, every leaf criterion is analyzed.
    pub criterion: Option<String>,
    pub deltas: Vec<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyBudget {
    pub total: f64,
    /// `binary` or `continuous`.
    pub mode: String,
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    pub costs: Option<BTreeMap<String, f64>>,
    /// A CSV file with `id,cost` rows, relative to the study file.
    #[serde(rename = "costsFile")]
    pub costs_file: Option<String>,
    pub bounds: Option<BTreeMap<String, StudyBounds>>,
    pub scenarios: Option<Vec<f64>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub rules: StudyRules,
    pub criteria: Vec<StudyCriterion>,
    pub alternatives: Vec<StudyAlternative>,
    pub evaluators: Vec<StudyEvaluator>,
    pub sensitivity: Option<StudySensitivity>,
    pub budget: Option<StudyBudget>,
}

pub fn read_study(path: &str) -> StudyResult<StudyConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: StudyConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_study: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> StudyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_summary: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_study() {
        let js = r#"{
            "outputSettings": {"studyName": "minimal"},
            "criteria": [{"id": "c", "name": "C"}],
            "alternatives": [{"id": "a", "name": "A"}],
            "evaluators": [{"id": "e"}]
        }"#;
        let config: StudyConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.rules, StudyRules::default());
        assert!(config.evaluators[0].comparisons.is_empty());
        assert!(config.budget.is_none());
    }

    #[test]
    fn judgments_and_inputs() {
        let js = r#"{
            "id": "e",
            "weight": 2.0,
            "includeInGroup": false,
            "comparisons": [{"node": "goal", "judgments": [{"i": 0, "j": 1, "value": 3}]}],
            "directInputs": [{"criterion": "price", "isBenefit": false, "values": [10, 20]}]
        }"#;
        let ev: StudyEvaluator = serde_json::from_str(js).unwrap();
        assert_eq!(ev.comparisons[0].judgments[0], Judgment::new(0, 1, 3.0));
        assert_eq!(ev.include_in_group, Some(false));
        assert!(!ev.direct_inputs[0].is_benefit);
    }
}
