//! Gaussian graphical model anomaly scoring.
//!
//! A training model (mean, covariance, precision) is estimated once. Each new
//! row is then scored either on its own or by re-estimating the model over the
//! trailing window that ends at the row and measuring how far it moved.

use crate::core::Table;
use crate::engine::graph_lasso::{graphical_lasso, GraphLassoConfig};
use crate::engine::linalg::{self, Matrix};
use crate::engine::stats;
use crate::error::{EngineError, EngineResult, Result};
use crate::params::{GraphDistance, SlidingWindow};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Covariance estimator behind the graphical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "learner")]
pub enum CovarianceLearner {
    /// Sparse precision via the graphical lasso.
    AnomalyGraphLasso(GraphLassoConfig),
    /// Ridge-regularised sample covariance.
    EmpiricalCovariance(EmpiricalCovariance),
}

/// Sample covariance estimator; has no hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmpiricalCovariance {}

impl Default for CovarianceLearner {
    fn default() -> Self {
        CovarianceLearner::AnomalyGraphLasso(GraphLassoConfig { alpha: 0.5 })
    }
}

impl CovarianceLearner {
    pub const NAMES: [&'static str; 2] = ["AnomalyGraphLasso", "EmpiricalCovariance"];

    pub fn name(&self) -> &'static str {
        match self {
            CovarianceLearner::AnomalyGraphLasso(_) => "AnomalyGraphLasso",
            CovarianceLearner::EmpiricalCovariance(_) => "EmpiricalCovariance",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            CovarianceLearner::AnomalyGraphLasso(config) => config.validate(),
            CovarianceLearner::EmpiricalCovariance(_) => Ok(()),
        }
    }

    fn estimate(&self, data: &Table) -> EngineResult<Gaussian> {
        let (mean, cov) = linalg::covariance(data);
        let (covariance, precision) = match self {
            CovarianceLearner::AnomalyGraphLasso(config) => {
                let model = graphical_lasso(&cov, config.alpha)?;
                (model.covariance, model.precision)
            }
            CovarianceLearner::EmpiricalCovariance(_) => {
                let covariance = linalg::regularize(&cov);
                let precision = linalg::inverse_spd(&covariance).ok_or_else(|| {
                    EngineError::ComputationError("covariance is not positive definite".into())
                })?;
                (covariance, precision)
            }
        };
        let log_det_precision = linalg::log_det_spd(&precision).ok_or_else(|| {
            EngineError::ComputationError("precision is not positive definite".into())
        })?;
        Ok(Gaussian {
            mean,
            covariance,
            precision,
            log_det_precision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GaussianGraphicalConfig {
    pub base_learner: CovarianceLearner,
    pub distance_metric: GraphDistance,
    /// `OutlierAnalysis` scores each row alone.
    pub sliding_window_size: SlidingWindow,
    /// Windows with fewer rows than this score NaN.
    pub sliding_window_data_cutoff: usize,
    /// Standardise columns with the training mean and deviation.
    pub scale: bool,
}

impl Default for GaussianGraphicalConfig {
    fn default() -> Self {
        Self {
            base_learner: CovarianceLearner::default(),
            distance_metric: GraphDistance::default(),
            sliding_window_size: SlidingWindow::default(),
            sliding_window_data_cutoff: 15,
            scale: true,
        }
    }
}

impl GaussianGraphicalConfig {
    pub fn validate(&self) -> Result<()> {
        self.base_learner.validate()
    }
}

#[derive(Debug, Clone)]
struct Gaussian {
    mean: Vec<f64>,
    covariance: Matrix,
    precision: Matrix,
    log_det_precision: f64,
}

impl Gaussian {
    fn mahalanobis_sq(&self, row: &[f64]) -> f64 {
        let centered: Vec<f64> = row.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        linalg::quad_form(&self.precision, &centered).max(0.0)
    }

    fn negative_log_likelihood(&self, row: &[f64]) -> f64 {
        let d = self.mean.len() as f64;
        0.5 * (d * (2.0 * PI).ln() - self.log_det_precision + self.mahalanobis_sq(row))
    }
}

#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Scaler {
    fn fit(data: &Table) -> EngineResult<Self> {
        let mut mean = Vec::with_capacity(data.cols());
        let mut std = Vec::with_capacity(data.cols());
        for j in 0..data.cols() {
            let column = data.column(j)?;
            mean.push(stats::mean(&column));
            let s = stats::std_dev(&column);
            std.push(if s.is_finite() && s > 1e-12 { s } else { 1.0 });
        }
        Ok(Self { mean, std })
    }

    fn apply(&self, data: &Table) -> EngineResult<Table> {
        let values = data
            .iter_rows()
            .flat_map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.std))
                    .map(|(x, (m, s))| (x - m) / s)
            })
            .collect();
        Table::new(data.rows(), data.cols(), values)
    }
}

#[derive(Debug, Clone)]
struct FittedGraphical {
    scaler: Option<Scaler>,
    model: Gaussian,
}

/// Scores rows by how far they, or the window ending at them, move away from
/// the training graphical model.
#[derive(Debug, Clone)]
pub struct GaussianGraphicalModel {
    config: GaussianGraphicalConfig,
    fitted: Option<FittedGraphical>,
}

impl GaussianGraphicalModel {
    /// Build from an already validated configuration.
    pub fn new(config: GaussianGraphicalConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &GaussianGraphicalConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Training precision matrix, in scaled units when scaling is on.
    pub fn precision(&self) -> Option<&Matrix> {
        self.fitted.as_ref().map(|f| &f.model.precision)
    }

    pub fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        if data.rows() < 2 {
            return Err(EngineError::InsufficientData {
                needed: 2,
                got: data.rows(),
            });
        }
        let scaler = if self.config.scale {
            Some(Scaler::fit(data)?)
        } else {
            None
        };
        let scaled = match &scaler {
            Some(s) => s.apply(data)?,
            None => data.clone(),
        };
        let model = self.config.base_learner.estimate(&scaled)?;
        debug!(
            rows = data.rows(),
            columns = data.cols(),
            learner = self.config.base_learner.name(),
            "fitted gaussian graphical model"
        );
        self.fitted = Some(FittedGraphical { scaler, model });
        Ok(())
    }

    /// One score per row; larger is more anomalous.
    pub fn predict(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(EngineError::FitRequired)?;
        let width = fitted.model.mean.len();
        if data.cols() != width {
            return Err(EngineError::DimensionMismatch {
                expected: width,
                got: data.cols(),
            });
        }
        let scaled = match &fitted.scaler {
            Some(s) => s.apply(data)?,
            None => data.clone(),
        };

        match self.config.sliding_window_size {
            SlidingWindow::OutlierAnalysis => Ok(scaled
                .iter_rows()
                .map(|row| match self.config.distance_metric {
                    GraphDistance::Likelihood => fitted.model.negative_log_likelihood(row),
                    _ => fitted.model.mahalanobis_sq(row).sqrt(),
                })
                .collect()),
            SlidingWindow::Size(size) => {
                let min_rows = self.config.sliding_window_data_cutoff.max(2);
                Ok((0..scaled.rows())
                    .map(|i| {
                        let start = (i + 1).saturating_sub(size);
                        let window = scaled.slice_rows(start, i + 1);
                        if size == 0 || window.rows() < min_rows {
                            return f64::NAN;
                        }
                        self.window_distance(&fitted.model, &window)
                    })
                    .collect())
            }
        }
    }

    /// Distance between the training model and one re-estimated on `window`.
    /// Windows whose model cannot be estimated score NaN.
    fn window_distance(&self, reference: &Gaussian, window: &Table) -> f64 {
        if self.config.distance_metric == GraphDistance::Likelihood {
            let total: f64 = window
                .iter_rows()
                .map(|row| reference.negative_log_likelihood(row))
                .sum();
            return total / window.rows() as f64;
        }

        let local = match self.config.base_learner.estimate(window) {
            Ok(local) => local,
            Err(err) => {
                debug!(%err, "window model could not be estimated");
                return f64::NAN;
            }
        };
        let d = reference.mean.len();

        match self.config.distance_metric {
            GraphDistance::KlDivergence => {
                // KL(local || reference)
                let shift: Vec<f64> = local
                    .mean
                    .iter()
                    .zip(&reference.mean)
                    .map(|(a, b)| a - b)
                    .collect();
                let trace = linalg::trace_product(&reference.precision, &local.covariance);
                let quad = linalg::quad_form(&reference.precision, &shift);
                0.5 * (trace + quad - d as f64 + local.log_det_precision
                    - reference.log_det_precision)
            }
            GraphDistance::FrobeniusNorm => {
                linalg::frobenius_norm(&difference(&local.precision, &reference.precision))
            }
            GraphDistance::Spectral => {
                let eig = linalg::symmetric_eigen(&difference(&local.precision, &reference.precision));
                eig.values.iter().fold(0.0, |m: f64, v| m.max(v.abs()))
            }
            GraphDistance::Mahalanobis => reference.mahalanobis_sq(&local.mean).sqrt(),
            GraphDistance::Likelihood => f64::NAN,
        }
    }
}

fn difference(a: &Matrix, b: &Matrix) -> Matrix {
    a.iter()
        .zip(b)
        .map(|(ra, rb)| ra.iter().zip(rb).map(|(x, y)| x - y).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlated(rows: usize, offset: usize) -> Table {
        let data: Vec<Vec<f64>> = (offset..offset + rows)
            .map(|i| {
                let t = i as f64;
                let a = (0.37 * t).sin() + 0.3 * (1.9 * t).cos();
                let b = 0.8 * a + 0.2 * (0.71 * t).sin();
                let c = (1.13 * t).cos();
                vec![a, b, c]
            })
            .collect();
        Table::from_rows(data).unwrap()
    }

    fn outlier_config(metric: GraphDistance) -> GaussianGraphicalConfig {
        GaussianGraphicalConfig {
            sliding_window_size: SlidingWindow::OutlierAnalysis,
            distance_metric: metric,
            ..GaussianGraphicalConfig::default()
        }
    }

    #[test]
    fn outlier_analysis_scores_each_row() {
        let mut model = GaussianGraphicalModel::new(outlier_config(GraphDistance::Mahalanobis));
        model.fit(&correlated(200, 0)).unwrap();
        let x = Table::from_rows(vec![vec![0.0, 0.0, 0.0], vec![1.0, -1.0, 0.0], vec![20.0, 20.0, 20.0]])
            .unwrap();
        let scores = model.predict(&x).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores[1] > scores[0]);
        assert!(scores[2] > scores[1]);
    }

    #[test]
    fn likelihood_is_a_negative_log_likelihood() {
        let mut model = GaussianGraphicalModel::new(outlier_config(GraphDistance::Likelihood));
        model.fit(&correlated(200, 0)).unwrap();
        let scores = model.predict(&correlated(10, 500)).unwrap();
        assert!(scores.iter().all(|s| s.is_finite()));
        let far = model
            .predict(&Table::from_rows(vec![vec![9.0, -9.0, 9.0]]).unwrap())
            .unwrap();
        assert!(far[0] > scores.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    }

    #[test]
    fn sliding_windows_below_the_cutoff_are_nan() {
        let mut model = GaussianGraphicalModel::new(GaussianGraphicalConfig {
            sliding_window_size: SlidingWindow::Size(30),
            ..GaussianGraphicalConfig::default()
        });
        model.fit(&correlated(200, 0)).unwrap();
        let scores = model.predict(&correlated(60, 200)).unwrap();
        assert_eq!(scores.len(), 60);
        assert!(scores[..14].iter().all(|s| s.is_nan()));
        assert!(scores[14..].iter().all(|s| s.is_finite()));
    }

    #[test]
    fn shifted_segment_moves_every_window_metric() {
        let normal = correlated(40, 300);
        let shifted: Vec<Vec<f64>> = Vec::<Vec<f64>>::from(correlated(40, 300))
            .into_iter()
            .map(|r| vec![r[0] + 3.0, -r[1], 4.0 * r[2]])
            .collect();
        let shifted = Table::from_rows(shifted).unwrap();

        for metric in GraphDistance::ALL {
            let mut model = GaussianGraphicalModel::new(GaussianGraphicalConfig {
                distance_metric: metric,
                base_learner: CovarianceLearner::EmpiricalCovariance(EmpiricalCovariance {}),
                ..GaussianGraphicalConfig::default()
            });
            model.fit(&correlated(300, 0)).unwrap();
            let calm = model.predict(&normal).unwrap()[39];
            let moved = model.predict(&shifted).unwrap()[39];
            assert!(moved > calm, "{metric}: {moved} <= {calm}");
        }
    }

    #[test]
    fn zero_window_scores_nan() {
        let mut model = GaussianGraphicalModel::new(GaussianGraphicalConfig {
            sliding_window_size: SlidingWindow::Size(0),
            ..GaussianGraphicalConfig::default()
        });
        model.fit(&correlated(50, 0)).unwrap();
        assert!(model.predict(&correlated(20, 0)).unwrap().iter().all(|s| s.is_nan()));
    }

    #[test]
    fn lifecycle_and_shape_errors() {
        let mut model = GaussianGraphicalModel::new(GaussianGraphicalConfig::default());
        assert_eq!(model.predict(&correlated(5, 0)).unwrap_err(), EngineError::FitRequired);
        model.fit(&correlated(50, 0)).unwrap();
        let narrow = Table::from_column(vec![1.0, 2.0]);
        assert_eq!(
            model.predict(&narrow).unwrap_err(),
            EngineError::DimensionMismatch { expected: 3, got: 1 }
        );
        assert!(model.fit(&Table::from_rows(vec![vec![1.0, 2.0]]).unwrap()).is_err());
    }

    #[test]
    fn config_json_uses_sentinels() {
        let config: GaussianGraphicalConfig =
            serde_json::from_str(r#"{"sliding_window_size": -1}"#).unwrap();
        assert_eq!(config.sliding_window_size, SlidingWindow::OutlierAnalysis);
        assert!(config.validate().is_ok());

        let config: GaussianGraphicalConfig = serde_json::from_str(
            r#"{"base_learner": {"learner": "EmpiricalCovariance"}, "distance_metric": "Spectral"}"#,
        )
        .unwrap();
        assert_eq!(config.base_learner.name(), "EmpiricalCovariance");

        assert!(serde_json::from_str::<GaussianGraphicalConfig>(r#"{"window": 3}"#).is_err());
        let bad: GaussianGraphicalConfig = serde_json::from_str(
            r#"{"base_learner": {"learner": "AnomalyGraphLasso", "alpha": -1.0}}"#,
        )
        .unwrap();
        assert!(bad.validate().unwrap_err().is_configuration());
    }
}
