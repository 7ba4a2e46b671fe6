//! `TSADPipeline`: windowed anomaly detection over caller-supplied steps.

use crate::core::{Prediction, Table};
use crate::engine::pipeline::Steps;
use crate::error::{EngineError, OperatorError, Result};
use crate::operators::traits::{AnomalyDetector, Described, Estimator};
use crate::operators::windowed::{self, WindowedConfig, WindowedCore, WINDOW_REQUIRED};
use crate::params::PredictionType;
use crate::schema::{common, OperatorSchema, Tags};
use serde_json::Value;

/// Time series anomaly detection pipeline.
///
/// Same hyperparameters as the windowed operators, except that `steps` is
/// required.
#[derive(Debug, Clone)]
pub struct TSADPipeline {
    config: WindowedConfig,
    core: WindowedCore,
}

impl TSADPipeline {
    pub fn new(config: WindowedConfig) -> Result<Self> {
        let steps = config
            .steps
            .clone()
            .ok_or_else(|| OperatorError::config("steps", "TSADPipeline requires a step list"))?;
        let core = WindowedCore::new(Self::NAME, &config, steps)?;
        Ok(Self { config, core })
    }

    /// Pipeline over `steps` with the other hyperparameters at their defaults.
    pub fn from_steps(steps: Steps) -> Result<Self> {
        Self::new(WindowedConfig::default().with_steps(steps))
    }

    pub fn config(&self) -> &WindowedConfig {
        &self.config
    }

    pub fn steps(&self) -> &Steps {
        self.core.steps()
    }

    pub fn effective_lookback(&self) -> Option<usize> {
        self.core.engine().effective_lookback()
    }

    pub fn predict_with(&self, x: &Table, kind: PredictionType) -> Result<Vec<f64>> {
        self.core.predict(Some(x), kind)
    }
}

impl Described for TSADPipeline {
    const NAME: &'static str = "TSADPipeline";
    type Config = WindowedConfig;

    fn schema() -> OperatorSchema {
        let mut properties = vec![("steps", common::required_steps())];
        properties.extend(windowed::window_properties());
        let mut required = vec!["steps"];
        required.extend(WINDOW_REQUIRED);
        OperatorSchema {
            name: Self::NAME,
            description: "Time series anomaly detection pipeline: slides a lookback window over \
                          the selected columns, runs the steps and scores the result."
                .into(),
            documentation_url: common::documentation_url(Self::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["classifier", "regressor", "estimator"]),
            hyperparams: common::hyperparams(properties, &required),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(true),
            output_predict: windowed::window_output(),
        }
    }

    fn from_config(config: WindowedConfig) -> Result<Self> {
        Self::new(config)
    }

    fn hyperparams(&self) -> Value {
        self.core.hyperparams(&self.config)
    }
}

impl Estimator for TSADPipeline {
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self> {
        self.core.fit(x, y)?;
        Ok(self)
    }

    fn predict(&self, x: Option<&Table>) -> Result<Prediction> {
        if !self.core.is_fitted() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        let x = x.ok_or(EngineError::InputRequired)?;
        Ok(Prediction::Vector(self.predict_with(x, PredictionType::Sliding)?))
    }

    fn is_fitted(&self) -> bool {
        self.core.is_fitted()
    }
}

impl AnomalyDetector for TSADPipeline {
    fn decision_function(&self, x: &Table) -> Result<Vec<f64>> {
        self.core.decision_function(x)
    }

    fn anomaly_score(&self, x: &Table, prediction_type: PredictionType) -> Result<Vec<f64>> {
        self.core.anomaly_score(x, prediction_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::Step;
    use crate::operators::windowed::{DefaultSteps, PcaSteps};
    use serde_json::json;

    fn signal(rows: usize) -> Table {
        Table::from_column((0..rows).map(|i| (i as f64 * 0.25).sin()).collect())
    }

    #[test]
    fn steps_are_required() {
        let err = TSADPipeline::new(WindowedConfig::default()).unwrap_err();
        assert!(matches!(err, OperatorError::Configuration { ref param, .. } if param == "steps"));
        assert!(TSADPipeline::from_json(&json!({})).unwrap_err().is_configuration());
    }

    #[test]
    fn steps_are_checked_before_anything_runs() {
        let only_flatten: Steps = PcaSteps::default_steps().into_iter().take(1).collect();
        assert!(TSADPipeline::from_steps(only_flatten).unwrap_err().is_configuration());
        assert!(TSADPipeline::from_steps(Vec::new()).unwrap_err().is_configuration());
    }

    #[test]
    fn steps_from_json_with_passthrough() {
        let json = json!({
            "steps": [
                ["Flatten", {"operator": "Flatten"}],
                ["skip", "passthrough"],
                ["PCA", {"operator": "GeneralizedAnomalyModel",
                         "base_learner": {"learner": "AnomalyPCA", "n_components": 1}}]
            ],
            "lookback_win": 6,
            "scoring_method": "std_label",
        });
        let mut op = TSADPipeline::from_json(&json).unwrap();
        assert!(matches!(op.steps()[1].1, Step::Passthrough));

        op.fit(&signal(60), None).unwrap();
        let labels = op.predict(Some(&signal(25))).unwrap();
        assert_eq!(labels.len(), 25);
        let batch = op.predict_with(&signal(25), PredictionType::Batch).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn schema_has_no_default_steps() {
        let schema = TSADPipeline::schema();
        assert!(schema.property("steps").unwrap().get("default").is_none());
        assert!(schema.defaults().get("steps").is_none());
        assert!(schema.required().contains(&"steps"));
    }
}
