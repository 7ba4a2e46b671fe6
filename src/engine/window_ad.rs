//! Windowed anomaly detection: slide a lookback window over the selected
//! columns, run a step list, reduce the result with a distance metric and
//! score it.

use crate::core::Table;
use crate::engine::distance::DeviationDistance;
use crate::engine::pipeline::{check_steps, fit_steps, score_steps, Frame, StageOutput, Steps};
use crate::engine::scoring::Scorer;
use crate::engine::window::sliding_windows;
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use crate::params::{ColumnSelection, DistanceMetric, PredictionType, ScoringMethod, TimeColumn};
use tracing::{debug, warn};

/// Configuration of a windowed anomaly detector.
#[derive(Debug, Clone)]
pub struct WindowADConfig {
    pub steps: Steps,
    pub feature_columns: ColumnSelection,
    pub target_columns: ColumnSelection,
    pub time_column: TimeColumn,
    pub lookback_win: usize,
    /// Trailing time steps of each window that form the deviation vector;
    /// `0` uses the whole window.
    pub pred_win: usize,
    pub store_lookback_history: bool,
    pub distance_metric: DistanceMetric,
    pub observation_window: usize,
    pub scoring_method: ScoringMethod,
    pub scoring_threshold: u32,
}

impl WindowADConfig {
    /// Configuration with the windowed defaults around the given steps.
    pub fn with_steps(steps: Steps) -> Self {
        Self {
            steps,
            feature_columns: ColumnSelection::All,
            target_columns: ColumnSelection::All,
            time_column: TimeColumn::Absent,
            lookback_win: 150,
            pred_win: 1,
            store_lookback_history: true,
            distance_metric: DistanceMetric::default(),
            observation_window: 10,
            scoring_method: ScoringMethod::default(),
            scoring_threshold: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_steps(&self.steps).map_err(|reason| OperatorError::config("steps", reason))?;

        check_columns(&self.feature_columns, &self.target_columns, self.time_column)?;

        if self.lookback_win == 0 {
            return Err(OperatorError::config("lookback_win", "must be at least 1"));
        }
        if self.pred_win > self.lookback_win {
            return Err(OperatorError::config(
                "pred_win",
                format!(
                    "must not exceed lookback_win ({}), got {}",
                    self.lookback_win, self.pred_win
                ),
            ));
        }
        if self.observation_window == 0 {
            return Err(OperatorError::config("observation_window", "must be at least 1"));
        }
        if self.scoring_method.rule().is_contamination()
            && !(1..=99).contains(&self.scoring_threshold)
        {
            return Err(OperatorError::config(
                "scoring_threshold",
                format!(
                    "{} needs a percentage between 1 and 99, got {}",
                    self.scoring_method, self.scoring_threshold
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FittedWindowAD {
    steps: Steps,
    columns: Vec<usize>,
    target_positions: Vec<usize>,
    lookback: usize,
    distance: Option<DeviationDistance>,
    scorer: Scorer,
    history: Option<Table>,
}

/// Windowed anomaly detector over a step list.
#[derive(Debug, Clone)]
pub struct WindowAD {
    config: WindowADConfig,
    fitted: Option<FittedWindowAD>,
}

impl WindowAD {
    /// Build from an already validated configuration.
    pub fn new(config: WindowADConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &WindowADConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Lookback actually used by the last fit.
    pub fn effective_lookback(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.lookback)
    }

    /// Raw training scores the scoring method was calibrated on.
    pub fn training_scores(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.scorer.reference())
    }

    fn model_columns(&self, width: usize) -> EngineResult<(Vec<usize>, Vec<usize>)> {
        model_columns(
            &self.config.feature_columns,
            &self.config.target_columns,
            self.config.time_column,
            width,
        )
    }

    pub fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        let (columns, target_positions) = self.model_columns(data.cols())?;
        let selected = data.select_columns(&columns)?;
        let rows = selected.rows();
        if rows < 2 {
            return Err(EngineError::InsufficientData { needed: 2, got: rows });
        }

        let lookback = if rows <= self.config.lookback_win {
            let shrunk = (rows / 2).max(1);
            warn!(
                requested = self.config.lookback_win,
                used = shrunk,
                rows,
                "not enough rows for the lookback window; shrinking it"
            );
            shrunk
        } else {
            self.config.lookback_win
        };

        let batch = sliding_windows(&selected, lookback)?;
        let mut steps = self.config.steps.clone();
        let output = fit_steps(&mut steps, Frame::Windows(batch))?;

        let pred_win = self.config.pred_win.min(lookback);
        let devs = deviations(&output, lookback, columns.len(), &target_positions, pred_win);
        let (distance, raw) = match devs {
            Some(devs) => {
                let distance = DeviationDistance::fit(
                    self.config.distance_metric,
                    self.config.observation_window,
                    &devs,
                )?;
                let raw = distance.apply(&devs, false);
                (Some(distance), raw)
            }
            None => (None, output.scores),
        };

        let scorer = Scorer::fit(
            self.config.scoring_method,
            self.config.scoring_threshold,
            self.config.observation_window,
            &raw,
        )?;

        let history = self
            .config
            .store_lookback_history
            .then(|| selected.slice_rows(rows - (lookback - 1), rows));

        debug!(
            rows,
            columns = columns.len(),
            lookback,
            windows = raw.len(),
            "fitted windowed anomaly detector"
        );
        self.fitted = Some(FittedWindowAD {
            steps,
            columns,
            target_positions,
            lookback,
            distance,
            scorer,
            history,
        });
        Ok(())
    }

    fn raw_scores(&self, data: Option<&Table>) -> EngineResult<(&FittedWindowAD, Vec<f64>)> {
        let fitted = self.fitted.as_ref().ok_or(EngineError::FitRequired)?;
        let data = data.ok_or(EngineError::InputRequired)?;
        let selected = data.select_columns(&fitted.columns)?;
        let series = match &fitted.history {
            Some(history) => history.vstack(&selected)?,
            None => selected,
        };

        let batch = sliding_windows(&series, fitted.lookback)?;
        let output = score_steps(&fitted.steps, Frame::Windows(batch))?;
        let pred_win = self.config.pred_win.min(fitted.lookback);
        let devs = deviations(
            &output,
            fitted.lookback,
            fitted.columns.len(),
            &fitted.target_positions,
            pred_win,
        );
        let raw = match (&fitted.distance, devs) {
            (Some(distance), Some(devs)) => distance.apply(&devs, true),
            _ => output.scores,
        };
        Ok((fitted, raw))
    }

    /// Raw per-window score after the distance metric.
    pub fn decision_function(&self, data: Option<&Table>) -> EngineResult<Vec<f64>> {
        Ok(self.raw_scores(data)?.1)
    }

    /// Continuous anomaly indicator; positive values are anomalous.
    pub fn anomaly_score(&self, data: Option<&Table>, kind: PredictionType) -> EngineResult<Vec<f64>> {
        let (fitted, raw) = self.raw_scores(data)?;
        Ok(select(fitted.scorer.indicator(&raw), kind))
    }

    /// Labels or indicator, depending on the scoring method.
    pub fn predict(&self, data: Option<&Table>, kind: PredictionType) -> EngineResult<Vec<f64>> {
        let (fitted, raw) = self.raw_scores(data)?;
        Ok(select(fitted.scorer.predict(&raw), kind))
    }
}

/// Column lists must be non-empty and must not name the time column.
pub(crate) fn check_columns(
    features: &ColumnSelection,
    targets: &ColumnSelection,
    time: TimeColumn,
) -> Result<()> {
    for (param, columns) in [("feature_columns", features), ("target_columns", targets)] {
        columns
            .check()
            .map_err(|reason| OperatorError::config(param, reason))?;
        if let Some(time) = time.index() {
            if columns.contains(time) {
                return Err(OperatorError::config(
                    param,
                    format!("column {time} is the time column"),
                ));
            }
        }
    }
    Ok(())
}

/// Feature columns plus target columns, ascending, without the time column,
/// and the positions of the targets among them.
pub(crate) fn model_columns(
    features: &ColumnSelection,
    targets: &ColumnSelection,
    time: TimeColumn,
    width: usize,
) -> EngineResult<(Vec<usize>, Vec<usize>)> {
    if let Some(index) = time.index() {
        if index >= width {
            return Err(EngineError::ColumnOutOfRange { index, width });
        }
    }
    let features = features.resolve(width, time)?;
    let targets = targets.resolve(width, time)?;
    let mut columns: Vec<usize> = features.iter().chain(&targets).copied().collect();
    columns.sort_unstable();
    columns.dedup();
    if columns.is_empty() {
        return Err(EngineError::NoModelColumns { width });
    }
    let positions = targets
        .iter()
        .filter_map(|t| columns.iter().position(|c| c == t))
        .collect();
    Ok((columns, positions))
}

fn select(values: Vec<f64>, kind: PredictionType) -> Vec<f64> {
    match kind {
        PredictionType::Sliding => values,
        PredictionType::Batch => values.last().map(|v| vec![*v]).unwrap_or_default(),
    }
}

/// Residuals of the target columns over the last `pred_win` steps of each
/// window. `None` when the final stage has no residuals.
fn deviations(
    output: &StageOutput,
    lookback: usize,
    width: usize,
    target_positions: &[usize],
    pred_win: usize,
) -> Option<Vec<Vec<f64>>> {
    let residuals = output.residuals.as_ref()?;
    if residuals.cols() != lookback * width {
        return Some(residuals.iter_rows().map(<[f64]>::to_vec).collect());
    }
    let first_step = if pred_win == 0 { 0 } else { lookback - pred_win };
    let positions: Vec<usize> = (first_step..lookback)
        .flat_map(|t| target_positions.iter().map(move |&c| t * width + c))
        .collect();
    Some(
        residuals
            .iter_rows()
            .map(|row| positions.iter().map(|&p| row[p]).collect())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generalized::{GeneralizedAnomalyModel, GeneralizedConfig};
    use crate::engine::pipeline::Step;
    use crate::engine::scoring::{ANOMALY, NORMAL};
    use crate::engine::window::Flatten;

    fn flatten_pca() -> Steps {
        vec![
            ("Flatten".to_string(), Step::stage(Flatten::new())),
            (
                "PCA".to_string(),
                Step::stage(GeneralizedAnomalyModel::new(GeneralizedConfig::default())),
            ),
        ]
    }

    fn config(lookback: usize) -> WindowADConfig {
        WindowADConfig {
            lookback_win: lookback,
            ..WindowADConfig::with_steps(flatten_pca())
        }
    }

    fn sines(rows: usize) -> Table {
        let data: Vec<Vec<f64>> = (0..rows)
            .map(|i| {
                let t = i as f64;
                vec![(0.3 * t).sin(), (0.17 * t).cos(), (0.05 * t).sin()]
            })
            .collect();
        Table::from_rows(data).unwrap()
    }

    #[test]
    fn sliding_output_has_one_value_per_row_with_history() {
        let mut ad = WindowAD::new(config(10));
        ad.fit(&sines(100)).unwrap();
        let out = ad.predict(Some(&sines(40)), PredictionType::Sliding).unwrap();
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|v| *v == ANOMALY || *v == NORMAL));
    }

    #[test]
    fn sliding_output_without_history_is_one_per_window() {
        let mut ad = WindowAD::new(WindowADConfig {
            store_lookback_history: false,
            ..config(10)
        });
        ad.fit(&sines(100)).unwrap();
        assert_eq!(ad.decision_function(Some(&sines(40))).unwrap().len(), 31);
        assert!(matches!(
            ad.decision_function(Some(&sines(5))),
            Err(EngineError::InsufficientData { needed: 10, got: 5 })
        ));
    }

    #[test]
    fn batch_returns_the_terminal_window() {
        let mut ad = WindowAD::new(config(10));
        ad.fit(&sines(100)).unwrap();
        let x = sines(30);
        let all = ad.anomaly_score(Some(&x), PredictionType::Sliding).unwrap();
        let last = ad.anomaly_score(Some(&x), PredictionType::Batch).unwrap();
        assert_eq!(last, vec![all[all.len() - 1]]);
    }

    #[test]
    fn lifecycle_errors() {
        let ad = WindowAD::new(config(10));
        assert_eq!(
            ad.predict(Some(&sines(20)), PredictionType::Sliding).unwrap_err(),
            EngineError::FitRequired
        );
        let mut ad = ad;
        ad.fit(&sines(50)).unwrap();
        assert_eq!(
            ad.predict(None, PredictionType::Sliding).unwrap_err(),
            EngineError::InputRequired
        );
    }

    #[test]
    fn short_input_shrinks_the_lookback() {
        let mut ad = WindowAD::new(config(150));
        ad.fit(&sines(100)).unwrap();
        assert_eq!(ad.effective_lookback(), Some(50));
        assert_eq!(ad.training_scores().map(<[f64]>::len), Some(51));

        let mut ad = WindowAD::new(config(5));
        assert_eq!(
            ad.fit(&sines(1)).unwrap_err(),
            EngineError::InsufficientData { needed: 2, got: 1 }
        );
    }

    #[test]
    fn spike_gets_the_largest_score_and_an_anomaly_label() {
        let mut ad = WindowAD::new(config(10));
        ad.fit(&sines(200)).unwrap();

        let mut rows: Vec<Vec<f64>> = sines(260).slice_rows(200, 260).into();
        rows[45][0] += 10.0;
        let x = Table::from_rows(rows).unwrap();

        let raw = ad.decision_function(Some(&x)).unwrap();
        let argmax = raw
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > raw[best] { i } else { best });
        assert_eq!(argmax, 45);

        let labels = ad.predict(Some(&x), PredictionType::Sliding).unwrap();
        assert_eq!(labels[45], ANOMALY);
    }

    #[test]
    fn columns_are_resolved_against_the_input() {
        let mut ad = WindowAD::new(WindowADConfig {
            feature_columns: ColumnSelection::indices([0]),
            target_columns: ColumnSelection::indices([4]),
            ..config(5)
        });
        assert_eq!(
            ad.fit(&sines(30)).unwrap_err(),
            EngineError::ColumnOutOfRange { index: 4, width: 3 }
        );

        let mut ad = WindowAD::new(WindowADConfig {
            time_column: TimeColumn::Index(2),
            ..config(5)
        });
        ad.fit(&sines(30)).unwrap();
        let (columns, targets) = ad.model_columns(3).unwrap();
        assert_eq!(columns, vec![0, 1]);
        assert_eq!(targets, vec![0, 1]);
    }

    #[test]
    fn refit_replaces_state() {
        let mut ad = WindowAD::new(WindowADConfig {
            feature_columns: ColumnSelection::indices([0]),
            target_columns: ColumnSelection::indices([0]),
            ..config(5)
        });
        ad.fit(&sines(40)).unwrap();
        let wide = Table::from_columns(&[
            sines(40).column(0).unwrap(),
            sines(40).column(1).unwrap(),
        ])
        .unwrap();
        ad.fit(&wide).unwrap();
        assert_eq!(ad.decision_function(Some(&wide)).unwrap().len(), 40);
    }

    #[test]
    fn validation_rules() {
        assert!(config(10).validate().is_ok());
        assert!(config(0).validate().unwrap_err().is_configuration());

        let bad = WindowADConfig {
            pred_win: 11,
            ..config(10)
        };
        assert!(bad.validate().is_err());

        let bad = WindowADConfig {
            scoring_method: "contamination".parse().unwrap(),
            scoring_threshold: 0,
            ..config(10)
        };
        assert!(bad.validate().is_err());

        let bad = WindowADConfig {
            time_column: TimeColumn::Index(1),
            feature_columns: ColumnSelection::indices([0, 1]),
            ..config(10)
        };
        assert!(bad.validate().is_err());

        let bad = WindowADConfig {
            observation_window: 0,
            ..config(10)
        };
        assert!(bad.validate().is_err());

        let bad = WindowADConfig::with_steps(vec![("Flatten".into(), Step::stage(Flatten::new()))]);
        assert!(bad.validate().is_err());
    }
}
