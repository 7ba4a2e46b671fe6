//! Schema fragments shared by several operators.
//!
//! Enumerations are generated from the Rust domains in [`crate::params`], so
//! a value the schema admits is always a value the configuration accepts.

use crate::engine::pipeline::{describe_steps, Steps, STAGE_OPERATORS};
use crate::params::{ColumnSelection, DistanceMetric, ScoringMethod, TimeColumn};
use serde_json::{json, Map, Value};

const HYPERPARAMS_DESCRIPTION: &str = "This first object lists all constructor arguments with \
     their types, but omits constraints for conditional hyperparameters.";

/// Documentation page of an operator.
pub fn documentation_url(name: &str) -> String {
    format!("https://docs.rs/anofox-operators/latest/anofox_operators/operators/struct.{name}.html")
}

/// Hyperparameter schema: a single closed object inside `allOf`.
pub fn hyperparams(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    json!({
        "allOf": [{
            "description": HYPERPARAMS_DESCRIPTION,
            "type": "object",
            "additionalProperties": false,
            "required": required,
            "relevantToOptimizer": [],
            "properties": properties,
        }]
    })
}

fn column_list(description: &str, default: &ColumnSelection) -> Value {
    json!({
        "description": description,
        "anyOf": [
            {"type": "array", "items": {"type": "integer", "minimum": 0}, "minItems": 1},
            {"enum": [-1], "description": "All columns except the time column."},
        ],
        "default": serde_json::to_value(default).unwrap_or(Value::Null),
    })
}

pub fn feature_columns(default: &ColumnSelection) -> Value {
    column_list(
        "Column indices for columns to be included as features in the model.",
        default,
    )
}

pub fn target_columns(default: &ColumnSelection) -> Value {
    column_list("Column indices for columns to be forecasted.", default)
}

pub fn time_column(default: TimeColumn) -> Value {
    json!({
        "description": "Column index for column containing timestamps for the time series data.",
        "anyOf": [
            {"type": "integer", "minimum": 0, "description": "Index of timestamps column"},
            {"enum": [-1], "description": "No timestamps column specified"},
        ],
        "default": serde_json::to_value(default).unwrap_or(Value::Null),
    })
}

pub fn lookback_win(default: usize) -> Value {
    json!({
        "description": "The number of time points to include in the generated feature windows.",
        "type": "integer",
        "minimum": 1,
        "default": default,
    })
}

pub fn pred_win(default: usize) -> Value {
    json!({
        "description": "The number of time points to include in the generated target windows; \
                        must not exceed lookback_win.",
        "type": "integer",
        "minimum": 0,
        "default": default,
    })
}

pub fn prediction_horizon(default: usize) -> Value {
    json!({
        "description": "Number of future time points produced by one prediction.",
        "type": "integer",
        "minimum": 1,
        "default": default,
    })
}

pub fn store_lookback_history() -> Value {
    json!({
        "description": "Whether the last lookback window should be stored in the model.",
        "type": "boolean",
        "default": true,
    })
}

pub fn distance_metric() -> Value {
    let names: Vec<&str> = DistanceMetric::ALL.iter().map(|m| m.as_str()).collect();
    json!({
        "description": "The distance metric to be used at the final estimator stage of the pipeline",
        "enum": names,
        "default": DistanceMetric::default().as_str(),
    })
}

pub fn observation_window() -> Value {
    json!({
        "description": "Observation window is used to compute anomaly scores by specified scoring_method",
        "type": "integer",
        "minimum": 1,
        "default": 10,
    })
}

pub fn scoring_method() -> Value {
    json!({
        "description": "Anomaly scoring method used to turn the distances into anomaly scores. \
                        Methods ending in _label return -1 for anomalies and 1 otherwise; \
                        _oneshot_label methods calibrate on the scored batch itself.",
        "enum": ScoringMethod::NAMES,
        "default": ScoringMethod::default().name(),
    })
}

pub fn scoring_threshold() -> Value {
    json!({
        "description": "Scoring threshold is used to label computed anomaly score as anomaly or normal. \
                        The contamination methods read it as a percentage between 1 and 99.",
        "type": "integer",
        "minimum": 0,
        "default": 2,
    })
}

fn step_list() -> Value {
    json!({
        "description": "List of (name, transform) tuples (implementing fit/transform) that are chained, \
                        in the order in which they are chained, with the last object an estimator.",
        "type": "array",
        "minItems": 1,
        "items": {
            "description": "Tuple of (name, transform).",
            "type": "array",
            "minItems": 2,
            "maxItems": 2,
            "items": [
                {"description": "Name.", "type": "string", "minLength": 1},
                {
                    "anyOf": [
                        {
                            "description": "Transform.",
                            "type": "object",
                            "required": ["operator"],
                            "properties": {"operator": {"enum": STAGE_OPERATORS}},
                        },
                        {"description": "NoOp", "enum": [null, "passthrough"]},
                    ]
                },
            ],
        },
    })
}

/// Optional step list; `null` selects the operator's default pipeline.
pub fn steps(default_pipeline: &Steps) -> Value {
    json!({
        "description": "Pipeline steps; null selects the default pipeline.",
        "anyOf": [
            step_list(),
            {"enum": [null], "description": describe_steps(default_pipeline).to_string()},
        ],
        "default": null,
    })
}

/// Step list without a default.
pub fn required_steps() -> Value {
    step_list()
}

fn samples() -> Value {
    json!({
        "anyOf": [
            {"type": "array", "items": {"type": "number"}},
            {"type": "array", "items": {"type": "array", "items": {"type": "number"}}},
        ]
    })
}

/// `fit(X, y)` arguments; 1-D input is a single column.
pub fn input_fit() -> Value {
    json!({
        "type": "object",
        "required": ["X"],
        "additionalProperties": false,
        "properties": {
            "X": samples(),
            "y": {"description": "Ignored by unsupervised operators."},
        },
    })
}

/// `predict(X)` arguments.
pub fn input_predict(x_required: bool) -> Value {
    let required: Vec<&str> = if x_required { vec!["X"] } else { Vec::new() };
    json!({
        "type": "object",
        "required": required,
        "additionalProperties": false,
        "properties": {"X": samples()},
    })
}

pub fn output_predict() -> Value {
    let mut out = samples();
    if let Some(map) = out.as_object_mut() {
        map.insert(
            "description".into(),
            json!("Predictions; the outer array is over samples."),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_come_from_the_rust_domains() {
        let metric = distance_metric();
        assert_eq!(metric["enum"].as_array().unwrap().len(), DistanceMetric::ALL.len());
        for name in metric["enum"].as_array().unwrap() {
            let parsed: DistanceMetric = name.as_str().unwrap().parse().unwrap();
            assert_eq!(parsed.as_str(), name.as_str().unwrap());
        }

        let scoring = scoring_method();
        assert_eq!(scoring["enum"].as_array().unwrap().len(), 27);
        assert_eq!(scoring["default"], "otsu_label");
    }

    #[test]
    fn column_defaults_use_the_sentinel() {
        assert_eq!(feature_columns(&ColumnSelection::All)["default"], json!(-1));
        assert_eq!(target_columns(&ColumnSelection::default())["default"], json!([0]));
        assert_eq!(time_column(TimeColumn::Absent)["default"], json!(-1));
    }

    #[test]
    fn optional_steps_default_to_null() {
        let schema = steps(&Vec::new());
        assert_eq!(schema["default"], Value::Null);
        assert_eq!(schema["anyOf"][1]["enum"][0], Value::Null);
        assert_eq!(
            required_steps()["items"]["items"][1]["anyOf"][0]["properties"]["operator"]["enum"],
            json!(STAGE_OPERATORS)
        );
    }

    #[test]
    fn predict_input_may_be_optional() {
        assert_eq!(input_predict(true)["required"], json!(["X"]));
        assert_eq!(input_predict(false)["required"], json!([]));
        assert!(output_predict()["description"].is_string());
    }
}
