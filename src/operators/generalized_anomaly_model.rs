//! `GeneralizedAnomalyModel`: a base anomaly learner with a chosen scoring
//! function and sign.

use crate::core::{Prediction, Table};
use crate::engine::generalized::{self, BaseLearner, GeneralizedConfig};
use crate::engine::isolation::IsolationForestConfig;
use crate::engine::neighbors::{LofConfig, NearestNeighborConfig};
use crate::engine::pca::AnomalyPcaConfig;
use crate::engine::graph_lasso::GraphLassoConfig;
use crate::engine::pipeline::Step;
use crate::error::{EngineError, OperatorError, Result};
use crate::operators::traits::{AnomalyDetector, Described, Estimator};
use crate::params::PredictionType;
use crate::schema::{common, OperatorSchema, Tags};
use serde_json::{json, Value};
use tracing::debug;

fn learner(name: &str, properties: Value) -> Value {
    let mut props = properties.as_object().cloned().unwrap_or_default();
    props.insert("learner".into(), json!({ "enum": [name] }));
    json!({
        "description": name,
        "type": "object",
        "required": ["learner"],
        "additionalProperties": false,
        "properties": props,
    })
}

fn seed(default: Option<u64>) -> Value {
    json!({
        "description": "Seed of the random number generator.",
        "anyOf": [{"type": "integer", "minimum": 0}, {"enum": [null]}],
        "default": default,
    })
}

fn n_neighbors(default: usize) -> Value {
    json!({"description": "Number of neighbours.", "type": "integer", "minimum": 1, "default": default})
}

pub(crate) fn pca_learner(defaults: &AnomalyPcaConfig) -> Value {
    learner(
        "AnomalyPCA",
        json!({
            "n_components": {
                "description": "Component count, or the fraction of variance to retain.",
                "anyOf": [
                    {"type": "integer", "minimum": 1},
                    {"type": "number", "exclusiveMinimum": true, "minimum": 0.0, "maximum": 1.0},
                ],
                "default": serde_json::to_value(defaults.n_components).unwrap_or(Value::Null),
            },
            "anomaly_score_option": {
                "enum": ["reconstruction", "hotelling"],
                "default": serde_json::to_value(defaults.anomaly_score_option).unwrap_or(Value::Null),
            },
            "random_state": seed(defaults.random_state),
        }),
    )
}

pub(crate) fn graph_lasso_learner(defaults: &GraphLassoConfig) -> Value {
    learner(
        "AnomalyGraphLasso",
        json!({
            "alpha": {
                "description": "Regularization parameter.",
                "type": "number",
                "minimum": 0.0,
                "default": defaults.alpha,
            }
        }),
    )
}

/// Schema of `base_learner`: one closed object per learner, tagged by `learner`.
pub(crate) fn base_learner_schema() -> Value {
    let forest = IsolationForestConfig::default();
    json!({
        "description": "Base anomaly learner.",
        "anyOf": [
            pca_learner(&AnomalyPcaConfig::default()),
            learner("NearestNeighborAnomalyModel", json!({
                "n_neighbors": n_neighbors(NearestNeighborConfig::default().n_neighbors),
            })),
            learner("LocalOutlierFactor", json!({
                "n_neighbors": n_neighbors(LofConfig::default().n_neighbors),
            })),
            learner("IsolationForest", json!({
                "n_estimators": {"type": "integer", "minimum": 1, "default": forest.n_estimators},
                "max_samples": {
                    "anyOf": [{"type": "integer", "minimum": 1}, {"enum": ["auto"]}],
                    "default": "auto",
                },
                "random_state": seed(forest.random_state),
            })),
            graph_lasso_learner(&GraphLassoConfig::default()),
        ],
        "default": serde_json::to_value(BaseLearner::default()).unwrap_or(Value::Null),
    })
}

/// Adapts a base anomaly learner into a pipeline estimator.
///
/// The score is `score_sign × predict_function(X)`; choose the sign so that
/// larger scores mean more anomalous.
#[derive(Debug, Clone)]
pub struct GeneralizedAnomalyModel {
    inner: generalized::GeneralizedAnomalyModel,
}

impl GeneralizedAnomalyModel {
    pub fn new(config: GeneralizedConfig) -> Result<Self> {
        config.validate()?;
        debug!(learner = config.base_learner.name(), "built GeneralizedAnomalyModel");
        Ok(Self {
            inner: generalized::GeneralizedAnomalyModel::new(config),
        })
    }

    pub fn config(&self) -> &GeneralizedConfig {
        self.inner.config()
    }

    fn fitted(&self) -> Result<&generalized::GeneralizedAnomalyModel> {
        if !self.inner.is_fitted() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        Ok(&self.inner)
    }
}

impl Default for GeneralizedAnomalyModel {
    fn default() -> Self {
        Self {
            inner: generalized::GeneralizedAnomalyModel::new(GeneralizedConfig::default()),
        }
    }
}

impl From<GeneralizedAnomalyModel> for Step {
    fn from(op: GeneralizedAnomalyModel) -> Self {
        Step::stage(op.inner)
    }
}

impl Described for GeneralizedAnomalyModel {
    const NAME: &'static str = "GeneralizedAnomalyModel";
    type Config = GeneralizedConfig;

    fn schema() -> OperatorSchema {
        OperatorSchema {
            name: Self::NAME,
            description: "Generalized anomaly model: scores samples with a base anomaly learner \
                          and a selectable scoring function and sign."
                .into(),
            documentation_url: common::documentation_url(Self::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["estimator", "outlier_detector"]),
            hyperparams: common::hyperparams(
                vec![
                    ("base_learner", base_learner_schema()),
                    ("fit_function", json!({"enum": ["fit"], "default": "fit"})),
                    (
                        "predict_function",
                        json!({
                            "description": "Learner method producing the score.",
                            "enum": ["decision_function", "score_samples"],
                            "default": "decision_function",
                        }),
                    ),
                    (
                        "score_sign",
                        json!({
                            "description": "Multiplier applied to the learner score.",
                            "enum": [1, -1],
                            "default": 1,
                        }),
                    ),
                ],
                &["base_learner", "fit_function", "predict_function", "score_sign"],
            ),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(true),
            output_predict: json!({
                "description": "Signed anomaly score per sample.",
                "type": "array",
                "items": {"type": "number"},
            }),
        }
    }

    fn from_config(config: GeneralizedConfig) -> Result<Self> {
        Self::new(config)
    }

    fn hyperparams(&self) -> Value {
        serde_json::to_value(self.inner.config()).unwrap_or_else(|_| json!({}))
    }
}

impl Estimator for GeneralizedAnomalyModel {
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self> {
        if y.is_some() {
            debug!(operator = Self::NAME, "ignoring y");
        }
        self.inner.fit_table(x)?;
        debug!(operator = Self::NAME, rows = x.rows(), cols = x.cols(), "fitted");
        Ok(self)
    }

    fn predict(&self, x: Option<&Table>) -> Result<Prediction> {
        let inner = self.fitted()?;
        let x = x.ok_or(EngineError::InputRequired)?;
        Ok(Prediction::Vector(inner.predict(x)?))
    }

    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }
}

impl AnomalyDetector for GeneralizedAnomalyModel {
    fn decision_function(&self, x: &Table) -> Result<Vec<f64>> {
        Ok(self.fitted()?.decision_function(x)?)
    }

    /// The signed score; `prediction_type` does not apply to row-wise models.
    fn anomaly_score(&self, x: &Table, _prediction_type: PredictionType) -> Result<Vec<f64>> {
        Ok(self.fitted()?.predict(x)?)
    }
}
