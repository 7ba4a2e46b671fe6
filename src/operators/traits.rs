//! Interfaces shared by all operators.

use crate::core::{Prediction, Table};
use crate::error::{OperatorError, Result};
use crate::params::PredictionType;
use crate::schema::OperatorSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// An operator that publishes a hyperparameter schema and can be built from
/// a configuration record.
pub trait Described: Sized {
    /// Operator name as published in schemas and the registry.
    const NAME: &'static str;

    /// Hyperparameter configuration. `Default` holds the schema defaults.
    type Config: Serialize + DeserializeOwned + Default + PartialEq + fmt::Debug;

    /// Full schema document of the operator.
    fn schema() -> OperatorSchema;

    /// Validate the configuration and build the operator.
    fn from_config(config: Self::Config) -> Result<Self>;

    /// Build from a JSON hyperparameter object. Missing keys take their
    /// defaults; unknown keys are rejected.
    fn from_json(hyperparams: &Value) -> Result<Self> {
        let config: Self::Config = decode_hyperparams(hyperparams)?;
        Self::from_config(config)
    }

    /// Current configuration as a JSON hyperparameter object.
    fn hyperparams(&self) -> Value;
}

/// Decode a hyperparameter object. A failure names the first key that
/// does not decode on its own; configurations default every missing key.
pub(crate) fn decode_hyperparams<C: DeserializeOwned>(hyperparams: &Value) -> Result<C> {
    serde_json::from_value(hyperparams.clone()).map_err(|err| {
        let param = hyperparams
            .as_object()
            .and_then(|object| {
                object.iter().find(|(key, value)| {
                    let single: Map<String, Value> =
                        std::iter::once((key.to_string(), (*value).clone())).collect();
                    serde_json::from_value::<C>(Value::Object(single)).is_err()
                })
            })
            .map_or_else(|| "hyperparams".to_string(), |(key, _)| key.clone());
        OperatorError::config(param, err.to_string())
    })
}

/// Fit/predict contract of an estimator operator.
///
/// `fit` returns the operator so calls can be chained:
/// `op.fit(&x, None)?.predict(Some(&x))?`.
pub trait Estimator {
    /// Fit on `x`. Unsupervised operators ignore `y`. Re-fitting replaces
    /// the previous state.
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self>;

    /// Predict on `x`, or from stored state when `x` is `None` and the
    /// operator supports it.
    fn predict(&self, x: Option<&Table>) -> Result<Prediction>;

    /// Whether `fit` has succeeded at least once.
    fn is_fitted(&self) -> bool;
}

/// Scoring contract of anomaly-oriented operators.
pub trait AnomalyDetector: Estimator {
    /// Raw per-sample anomaly score.
    fn decision_function(&self, x: &Table) -> Result<Vec<f64>>;

    /// Continuous anomaly indicator; positive values are anomalous.
    fn anomaly_score(&self, x: &Table, prediction_type: PredictionType) -> Result<Vec<f64>>;
}
