//! Step lists: named pipeline stages chained as transform → … → estimator.

use crate::core::Table;
use crate::engine::generalized::{GeneralizedAnomalyModel, GeneralizedConfig};
use crate::engine::window::{Flatten, WindowBatch};
use crate::error::{EngineError, EngineResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// Data flowing between pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Overlapping windows, before flattening.
    Windows(WindowBatch),
    /// One feature row per sample.
    Table(Table),
}

impl Frame {
    /// Number of samples (windows or rows).
    pub fn rows(&self) -> usize {
        match self {
            Frame::Windows(batch) => batch.count(),
            Frame::Table(table) => table.rows(),
        }
    }

    /// Borrow the frame as a table, or fail naming the stage that needed one.
    pub fn as_table(&self, stage: &str) -> EngineResult<&Table> {
        match self {
            Frame::Table(table) => Ok(table),
            Frame::Windows(_) => Err(EngineError::UnexpectedFrame(format!(
                "{stage} expects flattened rows; add a Flatten step before it"
            ))),
        }
    }
}

/// Role of a stage inside a step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Transformer,
    Estimator,
}

/// Scores produced by the final stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// One signed score per sample.
    pub scores: Vec<f64>,
    /// Per-sample reconstruction residuals, when the estimator has them.
    pub residuals: Option<Table>,
}

/// A pipeline stage.
///
/// Object safe so a step list can mix stage types; `box_clone` gives
/// step lists value semantics.
pub trait Stage: fmt::Debug + Send + Sync {
    /// Operator name of the stage.
    fn name(&self) -> &'static str;

    fn kind(&self) -> StageKind;

    /// Learn from the frame. Replaces any previous state.
    fn fit(&mut self, frame: &Frame) -> EngineResult<()>;

    /// Transform a frame (transformers only).
    fn transform(&self, _frame: Frame) -> EngineResult<Frame> {
        Err(EngineError::InvalidPipeline(format!(
            "{} is not a transformer",
            self.name()
        )))
    }

    /// Score a frame (estimators only).
    fn score(&self, _frame: &Frame) -> EngineResult<StageOutput> {
        Err(EngineError::InvalidPipeline(format!(
            "{} is not an estimator",
            self.name()
        )))
    }

    /// JSON description, `{"operator": <name>, ...hyperparameters}`.
    fn describe(&self) -> serde_json::Value;

    fn box_clone(&self) -> Box<dyn Stage>;
}

impl Clone for Box<dyn Stage> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// One entry of a step list.
#[derive(Debug, Clone)]
pub enum Step {
    /// Skip this step.
    Passthrough,
    Operator(Box<dyn Stage>),
}

impl Step {
    pub fn stage<S: Stage + 'static>(stage: S) -> Self {
        Step::Operator(Box::new(stage))
    }

    /// Operator name, or `"passthrough"`.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Passthrough => "passthrough",
            Step::Operator(stage) => stage.name(),
        }
    }

    pub fn describe(&self) -> serde_json::Value {
        match self {
            Step::Passthrough => serde_json::Value::String("passthrough".into()),
            Step::Operator(stage) => stage.describe(),
        }
    }
}

/// Steps compare by their JSON description.
impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.describe() == other.describe()
    }
}

/// Ordered `(name, step)` pairs.
pub type Steps = Vec<(String, Step)>;

/// Operators that can appear inside a step list.
pub const STAGE_OPERATORS: [&str; 2] = ["Flatten", "GeneralizedAnomalyModel"];

/// Stage description as accepted in JSON step lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operator")]
enum StageSpec {
    Flatten(FlattenSpec),
    GeneralizedAnomalyModel(GeneralizedConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FlattenSpec {}

impl StageSpec {
    fn build(self) -> Result<Step, String> {
        match self {
            StageSpec::Flatten(_) => Ok(Step::stage(Flatten::new())),
            StageSpec::GeneralizedAnomalyModel(config) => {
                config.validate().map_err(|e| e.to_string())?;
                Ok(Step::stage(GeneralizedAnomalyModel::new(config)))
            }
        }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.describe().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(Step::Passthrough),
            serde_json::Value::String(s) if s == "passthrough" => Ok(Step::Passthrough),
            serde_json::Value::Object(_) => {
                let spec: StageSpec = serde_json::from_value(value).map_err(D::Error::custom)?;
                spec.build().map_err(D::Error::custom)
            }
            other => Err(D::Error::custom(format!(
                "expected an operator object, \"passthrough\" or null, got {other}"
            ))),
        }
    }
}

/// Check the structure of a step list before anything runs.
pub fn check_steps(steps: &Steps) -> Result<(), String> {
    let (last_name, last) = steps.last().ok_or("step list must not be empty")?;

    let mut seen = HashSet::new();
    for (name, _) in steps {
        if name.is_empty() {
            return Err("step names must not be empty".into());
        }
        if !seen.insert(name.as_str()) {
            return Err(format!("duplicate step name `{name}`"));
        }
    }

    for (name, step) in &steps[..steps.len() - 1] {
        if let Step::Operator(stage) = step {
            if stage.kind() != StageKind::Transformer {
                return Err(format!(
                    "step `{name}` ({}) is an estimator; only the last step may be one",
                    stage.name()
                ));
            }
        }
    }

    match last {
        Step::Operator(stage) if stage.kind() == StageKind::Estimator => Ok(()),
        _ => Err(format!("last step `{last_name}` must be an estimator")),
    }
}

/// Fit every stage in order and score the training frame with the last one.
pub fn fit_steps(steps: &mut Steps, mut frame: Frame) -> EngineResult<StageOutput> {
    let last = steps.len().saturating_sub(1);
    for (i, (name, step)) in steps.iter_mut().enumerate() {
        let Step::Operator(stage) = step else {
            trace!(step = %name, "skipping passthrough step");
            continue;
        };
        trace!(step = %name, stage = stage.name(), rows = frame.rows(), "fitting stage");
        stage.fit(&frame)?;
        if i == last {
            return stage.score(&frame);
        }
        frame = stage.transform(frame)?;
    }
    Err(EngineError::InvalidPipeline(
        "last step must be an estimator".into(),
    ))
}

/// Run fitted stages over a frame and score it with the last one.
pub fn score_steps(steps: &Steps, mut frame: Frame) -> EngineResult<StageOutput> {
    let last = steps.len().saturating_sub(1);
    for (i, (name, step)) in steps.iter().enumerate() {
        let Step::Operator(stage) = step else {
            continue;
        };
        trace!(step = %name, stage = stage.name(), rows = frame.rows(), "running stage");
        if i == last {
            return stage.score(&frame);
        }
        frame = stage.transform(frame)?;
    }
    Err(EngineError::InvalidPipeline(
        "last step must be an estimator".into(),
    ))
}

/// JSON rendering of a step list, `[[name, step], ...]`.
pub fn describe_steps(steps: &Steps) -> serde_json::Value {
    serde_json::Value::Array(
        steps
            .iter()
            .map(|(name, step)| serde_json::json!([name, step.describe()]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten_then_pca() -> Steps {
        vec![
            ("Flatten".to_string(), Step::stage(Flatten::new())),
            (
                "PCA".to_string(),
                Step::stage(GeneralizedAnomalyModel::new(GeneralizedConfig::default())),
            ),
        ]
    }

    #[test]
    fn valid_step_list_passes() {
        assert!(check_steps(&flatten_then_pca()).is_ok());
    }

    #[test]
    fn step_list_rules() {
        assert!(check_steps(&Vec::new()).is_err());

        let mut steps = flatten_then_pca();
        steps[0].0 = "PCA".into();
        assert!(check_steps(&steps).unwrap_err().contains("duplicate"));

        let mut steps = flatten_then_pca();
        steps[0].0 = String::new();
        assert!(check_steps(&steps).is_err());

        let steps: Steps = vec![("only".into(), Step::stage(Flatten::new()))];
        assert!(check_steps(&steps).unwrap_err().contains("estimator"));

        let steps: Steps = vec![("noop".into(), Step::Passthrough)];
        assert!(check_steps(&steps).is_err());

        let mut steps = flatten_then_pca();
        steps.insert(0, ("skip".into(), Step::Passthrough));
        assert!(check_steps(&steps).is_ok());
    }

    #[test]
    fn steps_decode_from_json() {
        let json = r#"[
            ["Flatten", {"operator": "Flatten"}],
            ["noop", "passthrough"],
            ["nn", {"operator": "GeneralizedAnomalyModel",
                    "base_learner": {"learner": "NearestNeighborAnomalyModel", "n_neighbors": 3}}]
        ]"#;
        let steps: Steps = serde_json::from_str(json).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].1.name(), "Flatten");
        assert!(matches!(steps[1].1, Step::Passthrough));
        assert_eq!(steps[2].1.name(), "GeneralizedAnomalyModel");
        assert!(check_steps(&steps).is_ok());
    }

    #[test]
    fn unknown_operators_and_bad_hyperparameters_fail() {
        assert!(serde_json::from_str::<Steps>(r#"[["x", {"operator": "Scaler"}]]"#).is_err());
        assert!(serde_json::from_str::<Steps>(r#"[["x", {"operator": "Flatten", "depth": 2}]]"#).is_err());
        assert!(serde_json::from_str::<Steps>(
            r#"[["x", {"operator": "GeneralizedAnomalyModel", "score_sign": 3}]]"#
        )
        .is_err());
        assert!(serde_json::from_str::<Steps>(r#"[["x", 7]]"#).is_err());
    }

    #[test]
    fn describe_round_trips_through_json() {
        let steps = flatten_then_pca();
        let json = describe_steps(&steps);
        let back: Steps = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(describe_steps(&back), json);
        assert_eq!(json[1][1]["base_learner"]["learner"], "AnomalyPCA");
    }

    #[test]
    fn estimator_needs_flattened_rows() {
        let table = Table::from_rows((0..6).map(|i| vec![i as f64]).collect()).unwrap();
        let batch = crate::engine::window::sliding_windows(&table, 2).unwrap();
        let mut steps: Steps = vec![(
            "PCA".into(),
            Step::stage(GeneralizedAnomalyModel::new(GeneralizedConfig::default())),
        )];
        assert!(matches!(
            fit_steps(&mut steps, Frame::Windows(batch)),
            Err(EngineError::UnexpectedFrame(_))
        ));
    }
}
