//! `AutoRegression`: multi-column autoregressive forecaster.

use crate::core::{Prediction, Table};
use crate::engine::autoregression::{AutoRegressionConfig, VectorAutoRegression};
use crate::error::{OperatorError, Result};
use crate::operators::traits::{Described, Estimator};
use crate::schema::{common, OperatorSchema, Tags};
use serde_json::{json, Value};
use tracing::debug;

/// Forecasts the target columns `prediction_horizon` steps ahead from the
/// last `lookback_win` rows.
///
/// With `store_lookback_history` the tail of the training data is kept, so
/// `predict(None)` continues straight from the end of the fit data.
#[derive(Debug, Clone)]
pub struct AutoRegression {
    inner: VectorAutoRegression,
}

impl AutoRegression {
    pub fn new(config: AutoRegressionConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            lookback = config.lookback_win,
            horizon = config.prediction_horizon,
            "built AutoRegression"
        );
        Ok(Self {
            inner: VectorAutoRegression::new(config),
        })
    }

    pub fn config(&self) -> &AutoRegressionConfig {
        self.inner.config()
    }

    /// Per model column: intercept followed by the lag coefficients.
    pub fn coefficients(&self) -> Option<&[Vec<f64>]> {
        self.inner.coefficients()
    }
}

impl Default for AutoRegression {
    fn default() -> Self {
        Self {
            inner: VectorAutoRegression::new(AutoRegressionConfig::default()),
        }
    }
}

impl Described for AutoRegression {
    const NAME: &'static str = "AutoRegression";
    type Config = AutoRegressionConfig;

    fn schema() -> OperatorSchema {
        let defaults = AutoRegressionConfig::default();
        OperatorSchema {
            name: Self::NAME,
            description: "Autoregressive forecaster over a lookback window of the feature columns."
                .into(),
            documentation_url: common::documentation_url(Self::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["forecaster", "estimator"]),
            hyperparams: common::hyperparams(
                vec![
                    ("feature_columns", common::feature_columns(&defaults.feature_columns)),
                    ("target_columns", common::target_columns(&defaults.target_columns)),
                    ("time_column", common::time_column(defaults.time_column)),
                    ("lookback_win", common::lookback_win(defaults.lookback_win)),
                    (
                        "prediction_horizon",
                        common::prediction_horizon(defaults.prediction_horizon),
                    ),
                    ("store_lookback_history", common::store_lookback_history()),
                ],
                &[
                    "feature_columns",
                    "target_columns",
                    "time_column",
                    "lookback_win",
                    "prediction_horizon",
                    "store_lookback_history",
                ],
            ),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(false),
            output_predict: json!({
                "description": "Forecast rows; one column per target.",
                "type": "array",
                "items": {"type": "array", "items": {"type": "number"}},
            }),
        }
    }

    fn from_config(config: AutoRegressionConfig) -> Result<Self> {
        Self::new(config)
    }

    fn hyperparams(&self) -> Value {
        serde_json::to_value(self.inner.config()).unwrap_or_else(|_| json!({}))
    }
}

impl Estimator for AutoRegression {
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self> {
        if y.is_some() {
            debug!(operator = Self::NAME, "ignoring y");
        }
        self.inner.fit(x)?;
        debug!(operator = Self::NAME, rows = x.rows(), cols = x.cols(), "fitted");
        Ok(self)
    }

    /// `None` forecasts from the stored training tail.
    fn predict(&self, x: Option<&Table>) -> Result<Prediction> {
        if !self.inner.is_fitted() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        let forecast = self.inner.predict(x)?;
        debug!(operator = Self::NAME, shape = ?forecast.shape(), "forecast");
        Ok(Prediction::Matrix(forecast))
    }

    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }
}
