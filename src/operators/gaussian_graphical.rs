//! `GaussianGraphicalModel`: scores rows by how far the local covariance
//! structure moves away from the training one.

use crate::core::{Prediction, Table};
use crate::engine::graph_lasso::GraphLassoConfig;
use crate::engine::graphical::{self, CovarianceLearner, GaussianGraphicalConfig};
use crate::error::{EngineError, OperatorError, Result};
use crate::operators::generalized_anomaly_model::graph_lasso_learner;
use crate::operators::traits::{AnomalyDetector, Described, Estimator};
use crate::params::{GraphDistance, PredictionType, SlidingWindow};
use crate::schema::{common, OperatorSchema, Tags};
use serde_json::{json, Value};
use tracing::debug;

fn base_learner_schema() -> Value {
    let lasso = match CovarianceLearner::default() {
        CovarianceLearner::AnomalyGraphLasso(config) => config,
        CovarianceLearner::EmpiricalCovariance(_) => GraphLassoConfig::default(),
    };
    json!({
        "description": "Covariance model to be used.",
        "anyOf": [
            graph_lasso_learner(&lasso),
            {
                "description": "EmpiricalCovariance",
                "type": "object",
                "required": ["learner"],
                "additionalProperties": false,
                "properties": {"learner": {"enum": ["EmpiricalCovariance"]}},
            },
        ],
        "default": serde_json::to_value(CovarianceLearner::default()).unwrap_or(Value::Null),
    })
}

/// Gaussian graphical anomaly model.
#[derive(Debug, Clone)]
pub struct GaussianGraphicalModel {
    inner: graphical::GaussianGraphicalModel,
}

impl GaussianGraphicalModel {
    pub fn new(config: GaussianGraphicalConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            learner = config.base_learner.name(),
            metric = %config.distance_metric,
            "built GaussianGraphicalModel"
        );
        Ok(Self {
            inner: graphical::GaussianGraphicalModel::new(config),
        })
    }

    pub fn config(&self) -> &GaussianGraphicalConfig {
        self.inner.config()
    }

    /// Whether rows are scored individually rather than by window.
    pub fn is_outlier_analysis(&self) -> bool {
        self.config().sliding_window_size == SlidingWindow::OutlierAnalysis
    }

    /// Training precision matrix, in scaled units when `scale` is on.
    pub fn precision(&self) -> Option<&[Vec<f64>]> {
        self.inner.precision().map(|m| m.as_slice())
    }

    fn scores(&self, x: &Table) -> Result<Vec<f64>> {
        if !self.inner.is_fitted() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        Ok(self.inner.predict(x)?)
    }
}

impl Default for GaussianGraphicalModel {
    fn default() -> Self {
        Self {
            inner: graphical::GaussianGraphicalModel::new(GaussianGraphicalConfig::default()),
        }
    }
}

impl Described for GaussianGraphicalModel {
    const NAME: &'static str = "GaussianGraphicalModel";
    type Config = GaussianGraphicalConfig;

    fn schema() -> OperatorSchema {
        let defaults = GaussianGraphicalConfig::default();
        let metrics: Vec<&str> = GraphDistance::ALL.iter().map(|m| m.as_str()).collect();
        OperatorSchema {
            name: Self::NAME,
            description: "Gaussian graphical anomaly model: compares the covariance structure of \
                          each trailing window, or each row, against the training model."
                .into(),
            documentation_url: common::documentation_url(Self::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["classifier", "regressor", "estimator"]),
            hyperparams: common::hyperparams(
                vec![
                    ("base_learner", base_learner_schema()),
                    (
                        "distance_metric",
                        json!({
                            "description": "Distance metric.",
                            "enum": metrics,
                            "default": defaults.distance_metric.as_str(),
                        }),
                    ),
                    (
                        "sliding_window_size",
                        json!({
                            "description": "Rows per scoring window.",
                            "anyOf": [
                                {"type": "integer", "minimum": 0},
                                {"enum": [-1], "description": "The setting corresponds to \"outlier analysis\""},
                            ],
                            "default": serde_json::to_value(defaults.sliding_window_size)
                                .unwrap_or(Value::Null),
                        }),
                    ),
                    (
                        "sliding_window_data_cutoff",
                        json!({
                            "description": "Windows holding fewer rows score NaN.",
                            "type": "integer",
                            "minimum": 0,
                            "default": defaults.sliding_window_data_cutoff,
                        }),
                    ),
                    (
                        "scale",
                        json!({
                            "description": "Standardise columns with the training statistics.",
                            "type": "boolean",
                            "default": defaults.scale,
                        }),
                    ),
                ],
                &[
                    "base_learner",
                    "distance_metric",
                    "sliding_window_size",
                    "sliding_window_data_cutoff",
                    "scale",
                ],
            ),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(true),
            output_predict: json!({
                "description": "Anomaly score per row; NaN where the window is too short.",
                "type": "array",
                "items": {"type": "number"},
            }),
        }
    }

    fn from_config(config: GaussianGraphicalConfig) -> Result<Self> {
        Self::new(config)
    }

    fn hyperparams(&self) -> Value {
        serde_json::to_value(self.inner.config()).unwrap_or_else(|_| json!({}))
    }
}

impl Estimator for GaussianGraphicalModel {
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self> {
        if y.is_some() {
            debug!(operator = Self::NAME, "ignoring y");
        }
        self.inner.fit(x)?;
        debug!(operator = Self::NAME, rows = x.rows(), cols = x.cols(), "fitted");
        Ok(self)
    }

    fn predict(&self, x: Option<&Table>) -> Result<Prediction> {
        if !self.inner.is_fitted() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        let x = x.ok_or(EngineError::InputRequired)?;
        Ok(Prediction::Vector(self.scores(x)?))
    }

    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }
}

impl AnomalyDetector for GaussianGraphicalModel {
    fn decision_function(&self, x: &Table) -> Result<Vec<f64>> {
        self.scores(x)
    }

    /// Row scores; the window is set by `sliding_window_size`, not by
    /// `prediction_type`.
    fn anomaly_score(&self, x: &Table, _prediction_type: PredictionType) -> Result<Vec<f64>> {
        self.scores(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(rows: usize) -> Table {
        let data = (0..rows)
            .map(|i| {
                let t = i as f64 * 0.37;
                vec![t.sin(), (1.3 * t).cos(), (0.7 * t).sin() + 0.2 * t.cos()]
            })
            .collect();
        Table::from_rows(data).unwrap()
    }

    #[test]
    fn defaults_follow_the_schema() {
        let op = GaussianGraphicalModel::default();
        assert_eq!(op.config().distance_metric, GraphDistance::KlDivergence);
        assert_eq!(op.config().sliding_window_size, SlidingWindow::Size(50));
        assert_eq!(op.config().sliding_window_data_cutoff, 15);
        assert_eq!(op.config().base_learner.name(), "AnomalyGraphLasso");

        let schema = GaussianGraphicalModel::schema();
        let decoded = GaussianGraphicalModel::from_json(&schema.defaults()).unwrap();
        assert_eq!(decoded.config(), op.config());
    }

    #[test]
    fn predict_before_fit_is_a_state_error() {
        let op = GaussianGraphicalModel::default();
        assert!(op.predict(Some(&data(10))).unwrap_err().is_state());
    }

    #[test]
    fn negative_alpha_is_rejected() {
        let json = json!({"base_learner": {"learner": "AnomalyGraphLasso", "alpha": -1.0}});
        assert!(GaussianGraphicalModel::from_json(&json).unwrap_err().is_configuration());
    }

    #[test]
    fn outlier_analysis_scores_every_row() {
        let json = json!({
            "sliding_window_size": -1,
            "distance_metric": "Mahalanobis_Distance",
            "base_learner": {"learner": "EmpiricalCovariance"},
        });
        let mut op = GaussianGraphicalModel::from_json(&json).unwrap();
        assert!(op.is_outlier_analysis());
        op.fit(&data(80), None).unwrap();

        let scores = op.predict(Some(&data(12))).unwrap().into_vec();
        assert_eq!(scores.len(), 12);
        assert!(scores.iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn hyperparams_use_the_sentinel() {
        let op = GaussianGraphicalModel::new(GaussianGraphicalConfig {
            sliding_window_size: SlidingWindow::OutlierAnalysis,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(op.hyperparams()["sliding_window_size"], json!(-1));
    }
}
