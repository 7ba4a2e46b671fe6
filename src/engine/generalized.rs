//! Generalized anomaly model: adapts any base anomaly learner into a
//! pipeline estimator with a chosen scoring function and sign.

use crate::core::Table;
use crate::engine::graph_lasso::{AnomalyGraphLasso, GraphLassoConfig};
use crate::engine::isolation::{IsolationForest, IsolationForestConfig};
use crate::engine::neighbors::{LocalOutlierFactor, LofConfig, NearestNeighbor, NearestNeighborConfig};
use crate::engine::pca::{AnomalyPca, AnomalyPcaConfig};
use crate::engine::pipeline::{Frame, Stage, StageKind, StageOutput};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Common interface of the base anomaly learners.
pub trait AnomalyLearner {
    fn fit(&mut self, data: &Table) -> EngineResult<()>;

    /// Learner-specific decision score.
    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>>;

    /// Per-sample score where higher means more normal.
    fn score_samples(&self, data: &Table) -> EngineResult<Vec<f64>>;

    /// Reconstruction residuals, for learners that reconstruct their input.
    fn residuals(&self, _data: &Table) -> EngineResult<Option<Table>> {
        Ok(None)
    }
}

pub(crate) fn check_width(expected: usize, data: &Table) -> EngineResult<()> {
    if data.cols() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            got: data.cols(),
        });
    }
    Ok(())
}

/// Base learner selection, tagged by `"learner"` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "learner")]
pub enum BaseLearner {
    #[serde(rename = "AnomalyPCA")]
    AnomalyPca(AnomalyPcaConfig),
    NearestNeighborAnomalyModel(NearestNeighborConfig),
    LocalOutlierFactor(LofConfig),
    IsolationForest(IsolationForestConfig),
    AnomalyGraphLasso(GraphLassoConfig),
}

impl BaseLearner {
    pub const NAMES: [&'static str; 5] = [
        "AnomalyPCA",
        "NearestNeighborAnomalyModel",
        "LocalOutlierFactor",
        "IsolationForest",
        "AnomalyGraphLasso",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BaseLearner::AnomalyPca(_) => "AnomalyPCA",
            BaseLearner::NearestNeighborAnomalyModel(_) => "NearestNeighborAnomalyModel",
            BaseLearner::LocalOutlierFactor(_) => "LocalOutlierFactor",
            BaseLearner::IsolationForest(_) => "IsolationForest",
            BaseLearner::AnomalyGraphLasso(_) => "AnomalyGraphLasso",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BaseLearner::AnomalyPca(c) => c.validate(),
            BaseLearner::NearestNeighborAnomalyModel(c) => c.validate(),
            BaseLearner::LocalOutlierFactor(c) => c.validate(),
            BaseLearner::IsolationForest(c) => c.validate(),
            BaseLearner::AnomalyGraphLasso(c) => c.validate(),
        }
    }

    fn build(&self) -> Learner {
        match self {
            BaseLearner::AnomalyPca(c) => Learner::Pca(AnomalyPca::new(c.clone())),
            BaseLearner::NearestNeighborAnomalyModel(c) => {
                Learner::NearestNeighbor(NearestNeighbor::new(c.clone()))
            }
            BaseLearner::LocalOutlierFactor(c) => Learner::Lof(LocalOutlierFactor::new(c.clone())),
            BaseLearner::IsolationForest(c) => {
                Learner::IsolationForest(IsolationForest::new(c.clone()))
            }
            BaseLearner::AnomalyGraphLasso(c) => {
                Learner::GraphLasso(AnomalyGraphLasso::new(c.clone()))
            }
        }
    }
}

impl Default for BaseLearner {
    fn default() -> Self {
        BaseLearner::AnomalyPca(AnomalyPcaConfig::default())
    }
}

#[derive(Debug, Clone)]
enum Learner {
    Pca(AnomalyPca),
    NearestNeighbor(NearestNeighbor),
    Lof(LocalOutlierFactor),
    IsolationForest(IsolationForest),
    GraphLasso(AnomalyGraphLasso),
}

impl Learner {
    fn as_dyn(&self) -> &dyn AnomalyLearner {
        match self {
            Learner::Pca(l) => l,
            Learner::NearestNeighbor(l) => l,
            Learner::Lof(l) => l,
            Learner::IsolationForest(l) => l,
            Learner::GraphLasso(l) => l,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn AnomalyLearner {
        match self {
            Learner::Pca(l) => l,
            Learner::NearestNeighbor(l) => l,
            Learner::Lof(l) => l,
            Learner::IsolationForest(l) => l,
            Learner::GraphLasso(l) => l,
        }
    }
}

/// Learner method used to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitFunction {
    #[default]
    #[serde(rename = "fit")]
    Fit,
}

/// Learner method used to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictFunction {
    #[default]
    DecisionFunction,
    ScoreSamples,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GeneralizedConfig {
    pub base_learner: BaseLearner,
    pub fit_function: FitFunction,
    pub predict_function: PredictFunction,
    /// `1` keeps the learner's sign, `-1` flips it so that larger means more anomalous.
    pub score_sign: i8,
}

impl Default for GeneralizedConfig {
    fn default() -> Self {
        Self {
            base_learner: BaseLearner::default(),
            fit_function: FitFunction::Fit,
            predict_function: PredictFunction::DecisionFunction,
            score_sign: 1,
        }
    }
}

impl GeneralizedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.score_sign != 1 && self.score_sign != -1 {
            return Err(OperatorError::config(
                "score_sign",
                format!("must be 1 or -1, got {}", self.score_sign),
            ));
        }
        self.base_learner.validate()
    }
}

/// Base learner plus scoring convention.
#[derive(Debug, Clone)]
pub struct GeneralizedAnomalyModel {
    config: GeneralizedConfig,
    learner: Learner,
    fitted: bool,
}

impl GeneralizedAnomalyModel {
    /// Build from an already validated configuration.
    pub fn new(config: GeneralizedConfig) -> Self {
        let learner = config.base_learner.build();
        Self {
            config,
            learner,
            fitted: false,
        }
    }

    pub fn config(&self) -> &GeneralizedConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn fit_table(&mut self, data: &Table) -> EngineResult<()> {
        match self.config.fit_function {
            FitFunction::Fit => self.learner.as_dyn_mut().fit(data)?,
        }
        self.fitted = true;
        Ok(())
    }

    pub fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        if !self.fitted {
            return Err(EngineError::FitRequired);
        }
        self.learner.as_dyn().decision_function(data)
    }

    pub fn score_samples(&self, data: &Table) -> EngineResult<Vec<f64>> {
        if !self.fitted {
            return Err(EngineError::FitRequired);
        }
        self.learner.as_dyn().score_samples(data)
    }

    /// `score_sign × predict_function(data)`.
    pub fn predict(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let raw = match self.config.predict_function {
            PredictFunction::DecisionFunction => self.decision_function(data)?,
            PredictFunction::ScoreSamples => self.score_samples(data)?,
        };
        let sign = f64::from(self.config.score_sign);
        Ok(raw.into_iter().map(|s| sign * s).collect())
    }
}

impl Stage for GeneralizedAnomalyModel {
    fn name(&self) -> &'static str {
        "GeneralizedAnomalyModel"
    }

    fn kind(&self) -> StageKind {
        StageKind::Estimator
    }

    fn fit(&mut self, frame: &Frame) -> EngineResult<()> {
        let data = frame.as_table(self.name())?;
        self.fit_table(data)
    }

    fn score(&self, frame: &Frame) -> EngineResult<StageOutput> {
        let data = frame.as_table(self.name())?;
        Ok(StageOutput {
            scores: self.predict(data)?,
            residuals: self.learner.as_dyn().residuals(data)?,
        })
    }

    fn describe(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or_else(|_| json!({}));
        if let Some(map) = value.as_object_mut() {
            map.insert("operator".into(), json!(self.name()));
        }
        value
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data() -> Table {
        let rows = (0..30)
            .map(|i| {
                let t = i as f64;
                vec![t.sin(), (0.5 * t).cos()]
            })
            .collect();
        Table::from_rows(rows).unwrap()
    }

    #[test]
    fn score_sign_flips_learner_output() {
        let learner = BaseLearner::LocalOutlierFactor(LofConfig { n_neighbors: 5 });
        let mut plain = GeneralizedAnomalyModel::new(GeneralizedConfig {
            base_learner: learner.clone(),
            ..Default::default()
        });
        let mut flipped = GeneralizedAnomalyModel::new(GeneralizedConfig {
            base_learner: learner,
            score_sign: -1,
            ..Default::default()
        });
        plain.fit_table(&data()).unwrap();
        flipped.fit_table(&data()).unwrap();
        let a = plain.predict(&data()).unwrap();
        let b = flipped.predict(&data()).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(*x, -*y, epsilon = 1e-12);
        }
    }

    #[test]
    fn predict_function_selects_method() {
        let mut model = GeneralizedAnomalyModel::new(GeneralizedConfig {
            predict_function: PredictFunction::ScoreSamples,
            ..Default::default()
        });
        model.fit_table(&data()).unwrap();
        assert_eq!(model.predict(&data()).unwrap(), model.score_samples(&data()).unwrap());
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = GeneralizedAnomalyModel::new(GeneralizedConfig::default());
        assert!(matches!(model.predict(&data()), Err(EngineError::FitRequired)));
    }

    #[test]
    fn only_pca_reports_residuals() {
        let mut pca = GeneralizedAnomalyModel::new(GeneralizedConfig::default());
        let frame = Frame::Table(data());
        Stage::fit(&mut pca, &frame).unwrap();
        assert!(pca.score(&frame).unwrap().residuals.is_some());

        let mut nn = GeneralizedAnomalyModel::new(GeneralizedConfig {
            base_learner: BaseLearner::NearestNeighborAnomalyModel(NearestNeighborConfig::default()),
            ..Default::default()
        });
        Stage::fit(&mut nn, &frame).unwrap();
        assert!(nn.score(&frame).unwrap().residuals.is_none());
    }

    #[test]
    fn config_json_shape() {
        let cfg: GeneralizedConfig = serde_json::from_str(
            r#"{"base_learner": {"learner": "IsolationForest", "n_estimators": 10},
                "predict_function": "score_samples", "score_sign": -1}"#,
        )
        .unwrap();
        assert_eq!(cfg.base_learner.name(), "IsolationForest");
        assert_eq!(cfg.predict_function, PredictFunction::ScoreSamples);
        assert!(cfg.validate().is_ok());

        assert!(serde_json::from_str::<GeneralizedConfig>(r#"{"fit_function": "partial_fit"}"#).is_err());
        assert!(serde_json::from_str::<GeneralizedConfig>(
            r#"{"base_learner": {"learner": "AnomalyPCA", "whiten": true}}"#
        )
        .is_err());
        assert!(GeneralizedConfig {
            score_sign: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn learner_names_match_tags() {
        for name in BaseLearner::NAMES {
            let learner: BaseLearner = serde_json::from_value(json!({ "learner": name })).unwrap();
            assert_eq!(learner.name(), name);
        }
    }
}
