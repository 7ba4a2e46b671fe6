//! Vector autoregression over a lookback window.
//!
//! Each model column is regressed on an intercept plus the flattened previous
//! `lookback` rows of every model column. Forecasts beyond one step feed the
//! predictions back into the window.

use crate::core::Table;
use crate::engine::linalg;
use crate::engine::window_ad::{check_columns, model_columns};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use crate::params::{ColumnSelection, TimeColumn};
use serde::{Deserialize, Serialize};
use tracing::debug;

const RIDGE: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AutoRegressionConfig {
    pub feature_columns: ColumnSelection,
    pub target_columns: ColumnSelection,
    pub time_column: TimeColumn,
    pub lookback_win: usize,
    /// Number of future rows produced by one prediction.
    pub prediction_horizon: usize,
    pub store_lookback_history: bool,
}

impl Default for AutoRegressionConfig {
    fn default() -> Self {
        Self {
            feature_columns: ColumnSelection::default(),
            target_columns: ColumnSelection::default(),
            time_column: TimeColumn::Absent,
            lookback_win: 1,
            prediction_horizon: 1,
            store_lookback_history: true,
        }
    }
}

impl AutoRegressionConfig {
    pub fn validate(&self) -> Result<()> {
        check_columns(&self.feature_columns, &self.target_columns, self.time_column)?;
        if self.lookback_win == 0 {
            return Err(OperatorError::config("lookback_win", "must be at least 1"));
        }
        if self.prediction_horizon == 0 {
            return Err(OperatorError::config("prediction_horizon", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FittedVar {
    columns: Vec<usize>,
    target_positions: Vec<usize>,
    /// Per model column: intercept followed by the lag coefficients.
    coefficients: Vec<Vec<f64>>,
    history: Option<Table>,
}

/// Least-squares vector autoregression.
#[derive(Debug, Clone)]
pub struct VectorAutoRegression {
    config: AutoRegressionConfig,
    fitted: Option<FittedVar>,
}

impl VectorAutoRegression {
    /// Build from an already validated configuration.
    pub fn new(config: AutoRegressionConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &AutoRegressionConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Intercept and lag coefficients per model column.
    pub fn coefficients(&self) -> Option<&[Vec<f64>]> {
        self.fitted.as_ref().map(|f| f.coefficients.as_slice())
    }

    pub fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        let (columns, target_positions) = model_columns(
            &self.config.feature_columns,
            &self.config.target_columns,
            self.config.time_column,
            data.cols(),
        )?;
        let selected = data.select_columns(&columns)?;
        let lookback = self.config.lookback_win;
        let n = selected.rows();
        if n <= lookback {
            return Err(EngineError::InsufficientData {
                needed: lookback.saturating_add(1),
                got: n,
            });
        }

        let width = columns.len();
        let k = lookback
            .checked_mul(width)
            .and_then(|lags| lags.checked_add(1))
            .ok_or_else(|| EngineError::ComputationError("lag design is too wide".into()))?;
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![vec![0.0; k]; width];
        for t in lookback..n {
            let x = design_row(selected.slice_rows(t - lookback, t).as_slice());
            for i in 0..k {
                for j in i..k {
                    xtx[i][j] += x[i] * x[j];
                }
            }
            for (c, &y) in selected.row(t).iter().enumerate() {
                for i in 0..k {
                    xty[c][i] += x[i] * y;
                }
            }
        }
        for i in 0..k {
            xtx[i][i] += RIDGE;
            for j in 0..i {
                xtx[i][j] = xtx[j][i];
            }
        }

        let coefficients = xty
            .iter()
            .map(|b| {
                linalg::solve_symmetric(&xtx, b).ok_or_else(|| {
                    EngineError::ComputationError("normal equations are singular".into())
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let history = self
            .config
            .store_lookback_history
            .then(|| selected.slice_rows(n - lookback, n));

        debug!(rows = n, columns = width, lookback, "fitted vector autoregression");
        self.fitted = Some(FittedVar {
            columns,
            target_positions,
            coefficients,
            history,
        });
        Ok(())
    }

    /// Forecast `prediction_horizon` rows of the target columns.
    ///
    /// Without input the forecast continues from the stored history; with
    /// input it continues from the last `lookback` rows of `data`.
    pub fn predict(&self, data: Option<&Table>) -> EngineResult<Table> {
        let fitted = self.fitted.as_ref().ok_or(EngineError::FitRequired)?;
        let lookback = self.config.lookback_win;
        let seed = match data {
            Some(data) => {
                let selected = data.select_columns(&fitted.columns)?;
                if selected.rows() < lookback {
                    return Err(EngineError::InsufficientData {
                        needed: lookback,
                        got: selected.rows(),
                    });
                }
                selected.slice_rows(selected.rows() - lookback, selected.rows())
            }
            None => fitted
                .history
                .clone()
                .ok_or(EngineError::HistoryUnavailable)?,
        };

        let width = fitted.columns.len();
        let mut window = seed.into_vec();
        let mut out = Vec::with_capacity(self.config.prediction_horizon * fitted.target_positions.len());
        for _ in 0..self.config.prediction_horizon {
            let x = design_row(&window);
            let next: Vec<f64> = fitted
                .coefficients
                .iter()
                .map(|beta| beta.iter().zip(&x).map(|(b, v)| b * v).sum())
                .collect();
            out.extend(fitted.target_positions.iter().map(|&p| next[p]));
            window.drain(..width);
            window.extend(next);
        }
        Table::new(self.config.prediction_horizon, fitted.target_positions.len(), out)
    }
}

fn design_row(lags: &[f64]) -> Vec<f64> {
    let mut x = Vec::with_capacity(lags.len() + 1);
    x.push(1.0);
    x.extend_from_slice(lags);
    x
}
