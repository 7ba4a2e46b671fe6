//! Principal component anomaly model.
//!
//! Samples are projected onto the leading principal components of the
//! training data; the anomaly score is the squared reconstruction error or
//! Hotelling's T² inside the retained subspace.

use crate::core::Table;
use crate::engine::generalized::{check_width, AnomalyLearner};
use crate::engine::linalg::{self, symmetric_eigen};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use serde::{Deserialize, Serialize};

/// Number of retained components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Components {
    /// Exact count.
    Count(usize),
    /// Smallest count whose explained variance reaches this fraction.
    Fraction(f64),
}

/// Which statistic `decision_function` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreOption {
    #[default]
    Reconstruction,
    Hotelling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AnomalyPcaConfig {
    pub n_components: Components,
    pub anomaly_score_option: ScoreOption,
    /// Seed recorded with the model; the eigen solver is exact and does not draw.
    pub random_state: Option<u64>,
}

impl Default for AnomalyPcaConfig {
    fn default() -> Self {
        Self {
            n_components: Components::Fraction(0.9),
            anomaly_score_option: ScoreOption::Reconstruction,
            random_state: None,
        }
    }
}

impl AnomalyPcaConfig {
    pub fn validate(&self) -> Result<()> {
        match self.n_components {
            Components::Count(0) => Err(OperatorError::config(
                "n_components",
                "component count must be at least 1",
            )),
            Components::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(OperatorError::config(
                "n_components",
                format!("variance fraction must be in (0, 1], got {f}"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
struct FittedPca {
    mean: Vec<f64>,
    components: Vec<Vec<f64>>,
    variances: Vec<f64>,
}

/// PCA reconstruction / Hotelling anomaly model.
#[derive(Debug, Clone)]
pub struct AnomalyPca {
    config: AnomalyPcaConfig,
    fitted: Option<FittedPca>,
}

impl AnomalyPca {
    pub fn new(config: AnomalyPcaConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    /// Number of retained components after fitting.
    pub fn n_components(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.components.len())
    }

    fn state(&self) -> EngineResult<&FittedPca> {
        self.fitted.as_ref().ok_or(EngineError::FitRequired)
    }

    fn project(fitted: &FittedPca, row: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let centered: Vec<f64> = row.iter().zip(&fitted.mean).map(|(x, m)| x - m).collect();
        let scores: Vec<f64> = fitted
            .components
            .iter()
            .map(|v| v.iter().zip(&centered).map(|(a, b)| a * b).sum())
            .collect();
        let mut residual = centered;
        for (v, s) in fitted.components.iter().zip(&scores) {
            for (r, a) in residual.iter_mut().zip(v) {
                *r -= s * a;
            }
        }
        (scores, residual)
    }
}

/// Eigenpairs of the sample covariance, via the Gram matrix when there are
/// fewer samples than features.
fn principal_axes(centered: &[Vec<f64>], d: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = centered.len();
    if n >= d {
        let mut cov = vec![vec![0.0; d]; d];
        for row in centered {
            for i in 0..d {
                for j in i..d {
                    cov[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..d {
            for j in i..d {
                cov[i][j] /= n as f64;
                cov[j][i] = cov[i][j];
            }
        }
        let eig = symmetric_eigen(&cov);
        return (eig.values, eig.vectors);
    }

    let mut gram = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let dot: f64 = centered[i].iter().zip(&centered[j]).map(|(a, b)| a * b).sum();
            gram[i][j] = dot / n as f64;
            gram[j][i] = gram[i][j];
        }
    }
    let eig = symmetric_eigen(&gram);
    let mut values = Vec::new();
    let mut vectors = Vec::new();
    for (lambda, u) in eig.values.into_iter().zip(eig.vectors) {
        if lambda <= 1e-12 {
            continue;
        }
        let mut v = vec![0.0; d];
        for (row, &ui) in centered.iter().zip(&u) {
            for (vj, x) in v.iter_mut().zip(row) {
                *vj += ui * x;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
            values.push(lambda);
            vectors.push(v);
        }
    }
    (values, vectors)
}

impl AnomalyLearner for AnomalyPca {
    fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        let d = data.cols();
        let mean = linalg::column_means(data);
        let centered: Vec<Vec<f64>> = data
            .iter_rows()
            .map(|row| row.iter().zip(&mean).map(|(x, m)| x - m).collect())
            .collect();

        let (values, vectors) = principal_axes(&centered, d);
        let total: f64 = values.iter().filter(|v| **v > 0.0).sum();

        let available = values.iter().filter(|v| **v > 1e-12).count();
        let k = match self.config.n_components {
            Components::Count(c) => c.min(available),
            Components::Fraction(f) if total > 0.0 => {
                let mut cumulative = 0.0;
                let mut k = 0;
                for v in values.iter().take(available) {
                    cumulative += v;
                    k += 1;
                    if cumulative / total >= f - 1e-12 {
                        break;
                    }
                }
                k
            }
            Components::Fraction(_) => 0,
        };

        self.fitted = Some(FittedPca {
            mean,
            components: vectors.into_iter().take(k).collect(),
            variances: values.into_iter().take(k).collect(),
        });
        Ok(())
    }

    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let fitted = self.state()?;
        check_width(fitted.mean.len(), data)?;
        Ok(data
            .iter_rows()
            .map(|row| {
                let (scores, residual) = Self::project(fitted, row);
                match self.config.anomaly_score_option {
                    ScoreOption::Reconstruction => residual.iter().map(|r| r * r).sum(),
                    ScoreOption::Hotelling => scores
                        .iter()
                        .zip(&fitted.variances)
                        .filter(|(_, v)| **v > 1e-12)
                        .map(|(s, v)| s * s / v)
                        .sum(),
                }
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

    fn residuals(&self, data: &Table) -> EngineResult<Option<Table>> {
        let fitted = self.state()?;
        check_width(fitted.mean.len(), data)?;
        let mut out = Vec::with_capacity(data.rows() * data.cols());
        for row in data.iter_rows() {
            out.extend(Self::project(fitted, row).1);
        }
        Table::new(data.rows(), data.cols(), out).map(Some)
    }
}
