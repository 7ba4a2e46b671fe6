//! Windowed anomaly pipelines with a fixed default step list.
//!
//! `WindowedPCA`, `WindowedNN`, `WindowedLOF` and `WindowedIsolationForest`
//! share one implementation, [`Windowed`], and differ only in the
//! `Flatten` + learner pipeline they build when no steps are supplied.

use crate::core::{Prediction, Table};
use crate::engine::generalized::{self, BaseLearner, GeneralizedConfig, PredictFunction};
use crate::engine::isolation::IsolationForestConfig;
use crate::engine::neighbors::{LofConfig, NearestNeighborConfig};
use crate::engine::pca::{AnomalyPcaConfig, Components, ScoreOption};
use crate::engine::pipeline::{describe_steps, Step, Steps};
use crate::engine::window::Flatten;
use crate::engine::window_ad::{WindowAD, WindowADConfig};
use crate::error::{EngineError, OperatorError, Result};
use crate::operators::traits::{AnomalyDetector, Described, Estimator};
use crate::params::{ColumnSelection, DistanceMetric, PredictionType, ScoringMethod, TimeColumn};
use crate::schema::{common, OperatorSchema, Tags};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Seed of the default randomised learners.
pub const RANDOM_STATE: u64 = 42;

/// Hyperparameters of a windowed anomaly pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WindowedConfig {
    /// `None` selects the operator's default pipeline.
    pub steps: Option<Steps>,
    pub feature_columns: ColumnSelection,
    pub target_columns: ColumnSelection,
    pub time_column: TimeColumn,
    pub lookback_win: usize,
    pub pred_win: usize,
    pub store_lookback_history: bool,
    pub distance_metric: DistanceMetric,
    pub observation_window: usize,
    pub scoring_method: ScoringMethod,
    pub scoring_threshold: u32,
}

impl Default for WindowedConfig {
    fn default() -> Self {
        let defaults = WindowADConfig::with_steps(Vec::new());
        Self {
            steps: None,
            feature_columns: defaults.feature_columns,
            target_columns: defaults.target_columns,
            time_column: defaults.time_column,
            lookback_win: defaults.lookback_win,
            pred_win: defaults.pred_win,
            store_lookback_history: defaults.store_lookback_history,
            distance_metric: defaults.distance_metric,
            observation_window: defaults.observation_window,
            scoring_method: defaults.scoring_method,
            scoring_threshold: defaults.scoring_threshold,
        }
    }
}

impl WindowedConfig {
    pub fn with_steps(mut self, steps: Steps) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_lookback(mut self, lookback_win: usize) -> Self {
        self.lookback_win = lookback_win;
        self
    }

    pub fn with_pred_win(mut self, pred_win: usize) -> Self {
        self.pred_win = pred_win;
        self
    }

    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    pub fn with_scoring(mut self, method: ScoringMethod, threshold: u32) -> Self {
        self.scoring_method = method;
        self.scoring_threshold = threshold;
        self
    }

    pub fn with_history(mut self, store: bool) -> Self {
        self.store_lookback_history = store;
        self
    }

    /// Engine configuration around the given steps.
    pub(crate) fn engine_config(&self, steps: Steps) -> WindowADConfig {
        WindowADConfig {
            steps,
            feature_columns: self.feature_columns.clone(),
            target_columns: self.target_columns.clone(),
            time_column: self.time_column,
            lookback_win: self.lookback_win,
            pred_win: self.pred_win,
            store_lookback_history: self.store_lookback_history,
            distance_metric: self.distance_metric,
            observation_window: self.observation_window,
            scoring_method: self.scoring_method,
            scoring_threshold: self.scoring_threshold,
        }
    }
}

/// Windowed hyperparameters, minus `steps`.
pub(crate) fn window_properties() -> Vec<(&'static str, Value)> {
    let defaults = WindowedConfig::default();
    vec![
        ("feature_columns", common::feature_columns(&defaults.feature_columns)),
        ("target_columns", common::target_columns(&defaults.target_columns)),
        ("time_column", common::time_column(defaults.time_column)),
        ("lookback_win", common::lookback_win(defaults.lookback_win)),
        ("pred_win", common::pred_win(defaults.pred_win)),
        ("store_lookback_history", common::store_lookback_history()),
        ("distance_metric", common::distance_metric()),
        ("observation_window", common::observation_window()),
        ("scoring_method", common::scoring_method()),
        ("scoring_threshold", common::scoring_threshold()),
    ]
}

pub(crate) const WINDOW_REQUIRED: [&str; 10] = [
    "feature_columns",
    "target_columns",
    "time_column",
    "lookback_win",
    "pred_win",
    "store_lookback_history",
    "distance_metric",
    "observation_window",
    "scoring_method",
    "scoring_threshold",
];

/// Output of the windowed `predict`.
pub(crate) fn window_output() -> Value {
    json!({
        "description": "Per-window labels (-1 anomalous, 1 normal) for labelling scoring methods, \
                        otherwise the continuous anomaly indicator.",
        "type": "array",
        "items": {"type": "number"},
    })
}

/// Shared fit/predict plumbing of the windowed operators.
#[derive(Debug, Clone)]
pub(crate) struct WindowedCore {
    name: &'static str,
    engine: WindowAD,
}

impl WindowedCore {
    pub(crate) fn new(name: &'static str, config: &WindowedConfig, steps: Steps) -> Result<Self> {
        let engine_config = config.engine_config(steps);
        engine_config.validate()?;
        debug!(
            operator = name,
            steps = %describe_steps(&engine_config.steps),
            lookback = engine_config.lookback_win,
            "built windowed operator"
        );
        Ok(Self {
            name,
            engine: WindowAD::new(engine_config),
        })
    }

    pub(crate) fn steps(&self) -> &Steps {
        &self.engine.config().steps
    }

    pub(crate) fn engine(&self) -> &WindowAD {
        &self.engine
    }

    pub(crate) fn is_fitted(&self) -> bool {
        self.engine.is_fitted()
    }

    pub(crate) fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<()> {
        if y.is_some() {
            debug!(operator = self.name, "ignoring y");
        }
        self.engine.fit(x)?;
        debug!(
            operator = self.name,
            rows = x.rows(),
            cols = x.cols(),
            lookback = self.engine.effective_lookback(),
            "fitted"
        );
        Ok(())
    }

    fn fitted(&self) -> Result<&WindowAD> {
        if !self.engine.is_fitted() {
            return Err(OperatorError::NotFitted { operator: self.name });
        }
        Ok(&self.engine)
    }

    pub(crate) fn predict(&self, x: Option<&Table>, kind: PredictionType) -> Result<Vec<f64>> {
        let out = self.fitted()?.predict(x, kind)?;
        debug!(operator = self.name, outputs = out.len(), ?kind, "predicted");
        Ok(out)
    }

    pub(crate) fn decision_function(&self, x: &Table) -> Result<Vec<f64>> {
        Ok(self.fitted()?.decision_function(Some(x))?)
    }

    pub(crate) fn anomaly_score(&self, x: &Table, kind: PredictionType) -> Result<Vec<f64>> {
        Ok(self.fitted()?.anomaly_score(Some(x), kind)?)
    }

    /// Configuration with the steps in use rendered into it.
    pub(crate) fn hyperparams(&self, config: &WindowedConfig) -> Value {
        let mut value = serde_json::to_value(config).unwrap_or_else(|_| json!({}));
        if let Some(map) = value.as_object_mut() {
            map.insert("steps".into(), describe_steps(self.steps()));
        }
        value
    }
}

/// The default pipeline of one windowed operator.
pub trait DefaultSteps {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn default_steps() -> Steps;
}

fn flatten_then(name: &str, base_learner: BaseLearner, score_sign: i8) -> Steps {
    let model = generalized::GeneralizedAnomalyModel::new(GeneralizedConfig {
        base_learner,
        predict_function: PredictFunction::DecisionFunction,
        score_sign,
        ..GeneralizedConfig::default()
    });
    vec![
        ("Flatten".to_string(), Step::stage(Flatten::new())),
        (name.to_string(), Step::stage(model)),
    ]
}

/// Flatten + PCA reconstruction error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcaSteps;

impl DefaultSteps for PcaSteps {
    const NAME: &'static str = "WindowedPCA";
    const DESCRIPTION: &'static str =
        "Windowed PCA anomaly detector: flattens lookback windows and scores them by PCA \
         reconstruction error.";

    fn default_steps() -> Steps {
        flatten_then(
            "PCA",
            BaseLearner::AnomalyPca(AnomalyPcaConfig {
                n_components: Components::Fraction(0.9),
                anomaly_score_option: ScoreOption::Reconstruction,
                random_state: Some(RANDOM_STATE),
            }),
            1,
        )
    }
}

/// Flatten + mean distance to the nearest training windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborSteps;

impl DefaultSteps for NearestNeighborSteps {
    const NAME: &'static str = "WindowedNN";
    const DESCRIPTION: &'static str =
        "Windowed nearest-neighbour anomaly detector: flattens lookback windows and scores them \
         by their distance to the nearest training windows.";

    fn default_steps() -> Steps {
        flatten_then(
            "NearestNeighbor",
            BaseLearner::NearestNeighborAnomalyModel(NearestNeighborConfig::default()),
            1,
        )
    }
}

/// Flatten + local outlier factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LofSteps;

impl DefaultSteps for LofSteps {
    const NAME: &'static str = "WindowedLOF";
    const DESCRIPTION: &'static str =
        "Windowed local outlier factor anomaly detector: flattens lookback windows and scores \
         them by local density.";

    fn default_steps() -> Steps {
        flatten_then("LOF", BaseLearner::LocalOutlierFactor(LofConfig::default()), -1)
    }
}

/// Flatten + isolation forest.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolationForestSteps;

impl DefaultSteps for IsolationForestSteps {
    const NAME: &'static str = "WindowedIsolationForest";
    const DESCRIPTION: &'static str =
        "Windowed isolation forest anomaly detector: flattens lookback windows and scores them \
         by average isolation depth.";

    fn default_steps() -> Steps {
        flatten_then(
            "IsolationForest",
            BaseLearner::IsolationForest(IsolationForestConfig {
                random_state: Some(RANDOM_STATE),
                ..IsolationForestConfig::default()
            }),
            -1,
        )
    }
}

/// Windowed anomaly pipeline whose default steps come from `K`.
pub struct Windowed<K> {
    config: WindowedConfig,
    core: WindowedCore,
    kind: PhantomData<fn() -> K>,
}

pub type WindowedPCA = Windowed<PcaSteps>;
pub type WindowedNN = Windowed<NearestNeighborSteps>;
pub type WindowedLOF = Windowed<LofSteps>;
pub type WindowedIsolationForest = Windowed<IsolationForestSteps>;

impl<K: DefaultSteps> Windowed<K> {
    /// Validate `config` and build the pipeline; `steps: None` uses the
    /// default pipeline.
    pub fn new(config: WindowedConfig) -> Result<Self> {
        let steps = config.steps.clone().unwrap_or_else(K::default_steps);
        let core = WindowedCore::new(K::NAME, &config, steps)?;
        Ok(Self {
            config,
            core,
            kind: PhantomData,
        })
    }

    /// Operator with every hyperparameter at its default.
    pub fn with_defaults() -> Self {
        let config = WindowedConfig::default();
        let engine = WindowAD::new(config.engine_config(K::default_steps()));
        Self {
            config,
            core: WindowedCore {
                name: K::NAME,
                engine,
            },
            kind: PhantomData,
        }
    }

    pub fn config(&self) -> &WindowedConfig {
        &self.config
    }

    /// Steps in use, default or supplied.
    pub fn steps(&self) -> &Steps {
        self.core.steps()
    }

    /// Lookback actually used by the last fit.
    pub fn effective_lookback(&self) -> Option<usize> {
        self.core.engine().effective_lookback()
    }

    /// Predict with an explicit prediction type.
    pub fn predict_with(&self, x: &Table, kind: PredictionType) -> Result<Vec<f64>> {
        self.core.predict(Some(x), kind)
    }
}

impl<K: DefaultSteps> Default for Windowed<K> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<K> Clone for Windowed<K> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            core: self.core.clone(),
            kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for Windowed<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.core.name)
            .field("config", &self.config)
            .field("fitted", &self.core.is_fitted())
            .finish()
    }
}

impl<K: DefaultSteps> Described for Windowed<K> {
    const NAME: &'static str = K::NAME;
    type Config = WindowedConfig;

    fn schema() -> OperatorSchema {
        let mut properties = vec![("steps", common::steps(&K::default_steps()))];
        properties.extend(window_properties());
        let mut required = vec!["steps"];
        required.extend(WINDOW_REQUIRED);
        OperatorSchema {
            name: K::NAME,
            description: K::DESCRIPTION.into(),
            documentation_url: common::documentation_url(K::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["classifier", "regressor", "estimator"]),
            hyperparams: common::hyperparams(properties, &required),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(true),
            output_predict: window_output(),
        }
    }

    fn from_config(config: WindowedConfig) -> Result<Self> {
        Self::new(config)
    }

    fn hyperparams(&self) -> Value {
        self.core.hyperparams(&self.config)
    }
}

impl<K: DefaultSteps> Estimator for Windowed<K> {
    fn fit(&mut self, x: &Table, y: Option<&Table>) -> Result<&mut Self> {
        self.core.fit(x, y)?;
        Ok(self)
    }

    /// Sliding prediction; see [`Windowed::predict_with`] for batch mode.
    fn predict(&self, x: Option<&Table>) -> Result<Prediction> {
        if !self.core.is_fitted() {
            return Err(OperatorError::NotFitted { operator: K::NAME });
        }
        let x = x.ok_or(EngineError::InputRequired)?;
        Ok(Prediction::Vector(self.predict_with(x, PredictionType::Sliding)?))
    }

    fn is_fitted(&self) -> bool {
        self.core.is_fitted()
    }
}

impl<K: DefaultSteps> AnomalyDetector for Windowed<K> {
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
    use crate::engine::scoring::{ANOMALY, NORMAL};

    fn signal(rows: usize) -> Table {
        let data = (0..rows)
            .map(|i| {
                let t = i as f64 * 0.2;
                vec![t.sin(), t.cos()]
            })
            .collect();
        Table::from_rows(data).unwrap()
    }

    #[test]
    fn default_steps_are_flatten_then_learner() {
        for (steps, learner, sign) in [
            (PcaSteps::default_steps(), "AnomalyPCA", 1),
            (NearestNeighborSteps::default_steps(), "NearestNeighborAnomalyModel", 1),
            (LofSteps::default_steps(), "LocalOutlierFactor", -1),
            (IsolationForestSteps::default_steps(), "IsolationForest", -1),
        ] {
            assert_eq!(steps.len(), 2);
            assert_eq!(steps[0].0, "Flatten");
            let model = steps[1].1.describe();
            assert_eq!(model["base_learner"]["learner"], learner);
            assert_eq!(model["score_sign"], sign);
            assert_eq!(model["predict_function"], "decision_function");
        }
        let pca = PcaSteps::default_steps()[1].1.describe();
        assert_eq!(pca["base_learner"]["random_state"], 42);
        assert_eq!(pca["base_learner"]["n_components"], 0.9);
    }

    #[test]
    fn defaults_use_the_windowed_values() {
        let op = WindowedPCA::default();
        let config = op.config();
        assert_eq!(config.lookback_win, 150);
        assert_eq!(config.pred_win, 1);
        assert_eq!(config.feature_columns, ColumnSelection::All);
        assert_eq!(config.scoring_method.name(), "otsu_label");
        assert!(config.steps.is_none());
        assert_eq!(op.steps(), &PcaSteps::default_steps());
        assert!(!op.is_fitted());
    }

    #[test]
    fn calls_before_fit_are_state_errors() {
        let op = WindowedLOF::default();
        let x = signal(30);
        assert!(op.predict(Some(&x)).unwrap_err().is_state());
        assert!(op.decision_function(&x).unwrap_err().is_state());
        assert!(op.anomaly_score(&x, PredictionType::Sliding).unwrap_err().is_state());
    }

    #[test]
    fn configuration_errors_come_before_delegation() {
        let err = WindowedPCA::new(WindowedConfig::default().with_lookback(5).with_pred_win(6))
            .unwrap_err();
        assert_eq!(err, OperatorError::config("pred_win", "must not exceed lookback_win (5), got 6"));

        let json = json!({"lookback_win": 0});
        assert!(WindowedNN::from_json(&json).unwrap_err().is_configuration());
        assert!(WindowedNN::from_json(&json!({"window": 3})).unwrap_err().is_configuration());
    }

    #[test]
    fn sliding_and_batch_predictions() {
        let config = WindowedConfig::default().with_lookback(8);
        let mut op = WindowedNN::new(config).unwrap();
        op.fit(&signal(80), None).unwrap();

        let x = signal(20);
        let sliding = op.predict(Some(&x)).unwrap().into_vec();
        assert_eq!(sliding.len(), 20);
        assert!(sliding.iter().all(|&v| v == ANOMALY || v == NORMAL));

        let batch = op.predict_with(&x, PredictionType::Batch).unwrap();
        assert_eq!(batch, vec![sliding[19]]);
        assert_eq!(op.decision_function(&x).unwrap().len(), 20);
    }

    #[test]
    fn every_distance_metric_scores_each_row() {
        for metric in DistanceMetric::ALL {
            let config = WindowedConfig::default()
                .with_lookback(6)
                .with_distance_metric(metric);
            let mut op = WindowedNN::new(config).unwrap();
            op.fit(&signal(60), None).unwrap();

            let labels = op.predict(Some(&signal(15))).unwrap().into_vec();
            assert_eq!(labels.len(), 15, "{metric}");
            assert!(labels.iter().all(|&v| v == ANOMALY || v == NORMAL), "{metric}");
        }
    }

    #[test]
    fn predict_needs_input() {
        let mut op = WindowedPCA::new(WindowedConfig::default().with_lookback(4)).unwrap();
        op.fit(&signal(40), None).unwrap();
        assert_eq!(
            op.predict(None).unwrap_err(),
            OperatorError::Delegated(EngineError::InputRequired)
        );
    }

    #[test]
    fn hyperparams_render_the_steps_in_use() {
        let op = WindowedIsolationForest::default();
        let params = op.hyperparams();
        assert_eq!(params["steps"][1][0], "IsolationForest");
        assert_eq!(params["lookback_win"], 150);

        let rebuilt = WindowedIsolationForest::from_json(&params).unwrap();
        assert_eq!(rebuilt.steps(), op.steps());
    }

    #[test]
    fn supplied_steps_replace_the_default() {
        let steps = NearestNeighborSteps::default_steps();
        let op = WindowedPCA::new(WindowedConfig::default().with_steps(steps.clone())).unwrap();
        assert_eq!(op.steps(), &steps);
    }
}
