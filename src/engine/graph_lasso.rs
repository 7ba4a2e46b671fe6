//! Sparse inverse covariance estimation (graphical lasso) and the anomaly
//! model built on it.

use crate::core::Table;
use crate::engine::generalized::{check_width, AnomalyLearner};
use crate::engine::linalg::{self, Matrix};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_ITER: usize = 100;
const TOLERANCE: f64 = 1e-4;

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Covariance and precision estimated by the graphical lasso.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseCovariance {
    pub covariance: Matrix,
    pub precision: Matrix,
}

/// Block coordinate descent graphical lasso on an empirical covariance.
///
/// Falls back to the inverse of the ridge-regularised covariance when the
/// iteration produces non-finite values.
pub fn graphical_lasso(emp: &Matrix, alpha: f64) -> EngineResult<SparseCovariance> {
    let p = emp.len();
    if p == 0 {
        return Err(EngineError::EmptyData);
    }

    let mut w = emp.clone();
    for (i, row) in w.iter_mut().enumerate() {
        row[i] += alpha;
    }
    let mut betas = vec![vec![0.0; p.saturating_sub(1)]; p];

    for iter in 0..MAX_ITER {
        let mut change = 0.0;
        for j in 0..p {
            let idx: Vec<usize> = (0..p).filter(|&i| i != j).collect();
            let beta = &mut betas[j];

            for _ in 0..MAX_ITER {
                let mut max_delta: f64 = 0.0;
                for (a, &k) in idx.iter().enumerate() {
                    let mut r = emp[k][j];
                    for (b, &l) in idx.iter().enumerate() {
                        if b != a {
                            r -= w[k][l] * beta[b];
                        }
                    }
                    let updated = soft_threshold(r, alpha) / w[k][k].max(1e-12);
                    max_delta = max_delta.max((updated - beta[a]).abs());
                    beta[a] = updated;
                }
                if max_delta < TOLERANCE {
                    break;
                }
            }

            for &i in &idx {
                let w12: f64 = idx.iter().enumerate().map(|(b, &l)| w[i][l] * beta[b]).sum();
                change += (w12 - w[i][j]).abs();
                w[i][j] = w12;
                w[j][i] = w12;
            }
        }
        let pairs = (p * p.saturating_sub(1)).max(1) as f64;
        if change / pairs < TOLERANCE {
            debug!(iterations = iter + 1, "graphical lasso converged");
            break;
        }
    }

    let mut precision = vec![vec![0.0; p]; p];
    for j in 0..p {
        let idx: Vec<usize> = (0..p).filter(|&i| i != j).collect();
        let beta = &betas[j];
        let w12_beta: f64 = idx.iter().enumerate().map(|(a, &i)| w[i][j] * beta[a]).sum();
        let theta_jj = 1.0 / (w[j][j] - w12_beta).max(1e-12);
        precision[j][j] = theta_jj;
        for (a, &i) in idx.iter().enumerate() {
            precision[i][j] = -beta[a] * theta_jj;
        }
    }
    for i in 0..p {
        for j in (i + 1)..p {
            let avg = 0.5 * (precision[i][j] + precision[j][i]);
            precision[i][j] = avg;
            precision[j][i] = avg;
        }
    }

    let finite = w.iter().chain(precision.iter()).flatten().all(|v| v.is_finite());
    if finite && linalg::cholesky(&precision).is_some() {
        return Ok(SparseCovariance {
            covariance: w,
            precision,
        });
    }

    debug!("graphical lasso diverged; using ridge-regularised covariance");
    let covariance = linalg::regularize(emp);
    let precision = linalg::inverse_spd(&covariance).ok_or_else(|| {
        EngineError::ComputationError("covariance is not positive definite".into())
    })?;
    Ok(SparseCovariance {
        covariance,
        precision,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GraphLassoConfig {
    /// L1 penalty on the off-diagonal precision entries.
    pub alpha: f64,
}

impl Default for GraphLassoConfig {
    fn default() -> Self {
        Self { alpha: 0.01 }
    }
}

impl GraphLassoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(OperatorError::config(
                "alpha",
                format!("must be a finite non-negative number, got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FittedGraph {
    mean: Vec<f64>,
    model: SparseCovariance,
}

/// Scores samples by squared Mahalanobis distance under a sparse precision.
#[derive(Debug, Clone)]
pub struct AnomalyGraphLasso {
    config: GraphLassoConfig,
    fitted: Option<FittedGraph>,
}

impl AnomalyGraphLasso {
    pub fn new(config: GraphLassoConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn precision(&self) -> Option<&Matrix> {
        self.fitted.as_ref().map(|f| &f.model.precision)
    }
}

impl AnomalyLearner for AnomalyGraphLasso {
    fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        let (mean, cov) = linalg::covariance(data);
        let model = graphical_lasso(&cov, self.config.alpha)?;
        self.fitted = Some(FittedGraph { mean, model });
        Ok(())
    }

    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(EngineError::FitRequired)?;
        check_width(fitted.mean.len(), data)?;
        Ok(data
            .iter_rows()
            .map(|row| {
                let centered: Vec<f64> = row.iter().zip(&fitted.mean).map(|(x, m)| x - m).collect();
                linalg::quad_form(&fitted.model.precision, &centered)
            })
            .collect())
    }

    fn score_samples(&self, data: &Table) -> EngineResult<Vec<f64>> {
        Ok(self
            .decision_function(data)?
            .into_iter()
            .map(|s| -s)
            .collect())
    }
}
