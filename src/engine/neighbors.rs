//! Distance-based anomaly models: mean k-nearest-neighbour distance and the
//! local outlier factor in novelty mode.

use crate::core::Table;
use crate::engine::generalized::{check_width, AnomalyLearner};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use serde::{Deserialize, Serialize};

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// The `k` nearest training rows to `query`, closest first.
fn nearest(train: &Table, query: &[f64], k: usize, exclude: Option<usize>) -> Vec<(usize, f64)> {
    let mut dists: Vec<(usize, f64)> = train
        .iter_rows()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .map(|(i, row)| (i, euclidean(row, query)))
        .collect();
    dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    dists.truncate(k);
    dists
}

fn check_neighbors(n_neighbors: usize) -> Result<()> {
    if n_neighbors == 0 {
        return Err(OperatorError::config(
            "n_neighbors",
            "must be at least 1",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NearestNeighborConfig {
    pub n_neighbors: usize,
}

impl Default for NearestNeighborConfig {
    fn default() -> Self {
        Self { n_neighbors: 5 }
    }
}

impl NearestNeighborConfig {
    pub fn validate(&self) -> Result<()> {
        check_neighbors(self.n_neighbors)
    }
}

/// Scores a sample by its mean distance to the nearest training samples.
#[derive(Debug, Clone)]
pub struct NearestNeighbor {
    config: NearestNeighborConfig,
    train: Option<Table>,
}

impl NearestNeighbor {
    pub fn new(config: NearestNeighborConfig) -> Self {
        Self {
            config,
            train: None,
        }
    }
}

impl AnomalyLearner for NearestNeighbor {
    fn fit(&mut self, data: &Table) -> EngineResult<()> {
        if data.is_empty() {
            return Err(EngineError::EmptyData);
        }
        self.train = Some(data.clone());
        Ok(())
    }

    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let train = self.train.as_ref().ok_or(EngineError::FitRequired)?;
        check_width(train.cols(), data)?;
        let k = self.config.n_neighbors.min(train.rows());
        Ok(data
            .iter_rows()
            .map(|row| {
                let hits = nearest(train, row, k, None);
                hits.iter().map(|(_, d)| d).sum::<f64>() / hits.len() as f64
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LofConfig {
    pub n_neighbors: usize,
}

impl Default for LofConfig {
    fn default() -> Self {
        Self { n_neighbors: 20 }
    }
}

impl LofConfig {
    pub fn validate(&self) -> Result<()> {
        check_neighbors(self.n_neighbors)
    }
}

#[derive(Debug, Clone)]
struct FittedLof {
    train: Table,
    k: usize,
    k_distance: Vec<f64>,
    lrd: Vec<f64>,
}

/// Local outlier factor, novelty mode: new samples are compared against the
/// local density of the training set.
#[derive(Debug, Clone)]
pub struct LocalOutlierFactor {
    config: LofConfig,
    fitted: Option<FittedLof>,
}

impl LocalOutlierFactor {
    pub fn new(config: LofConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    fn lof(fitted: &FittedLof, row: &[f64]) -> f64 {
        let hits = nearest(&fitted.train, row, fitted.k, None);
        let reach: f64 = hits
            .iter()
            .map(|&(o, d)| d.max(fitted.k_distance[o]))
            .sum::<f64>()
            / hits.len() as f64;
        let lrd = 1.0 / (reach + 1e-10);
        let neighbour_lrd = hits.iter().map(|&(o, _)| fitted.lrd[o]).sum::<f64>() / hits.len() as f64;
        neighbour_lrd / lrd
    }

    /// Local outlier factor of each sample (≈1 inliers, larger outliers).
    pub fn outlier_factor(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(EngineError::FitRequired)?;
        check_width(fitted.train.cols(), data)?;
        Ok(data.iter_rows().map(|row| Self::lof(fitted, row)).collect())
    }
}

impl AnomalyLearner for LocalOutlierFactor {
    fn fit(&mut self, data: &Table) -> EngineResult<()> {
        let n = data.rows();
        if n < 2 {
            return Err(EngineError::InsufficientData { needed: 2, got: n });
        }
        let k = self.config.n_neighbors.min(n - 1);

        let neighbours: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| nearest(data, data.row(i), k, Some(i)))
            .collect();
        let k_distance: Vec<f64> = neighbours
            .iter()
            .map(|hits| hits.last().map(|h| h.1).unwrap_or(0.0))
            .collect();
        let lrd: Vec<f64> = neighbours
            .iter()
            .map(|hits| {
                let reach = hits
                    .iter()
                    .map(|&(o, d)| d.max(k_distance[o]))
                    .sum::<f64>()
                    / hits.len() as f64;
                1.0 / (reach + 1e-10)
            })
            .collect();

        self.fitted = Some(FittedLof {
            train: data.clone(),
            k,
            k_distance,
            lrd,
        });
        Ok(())
    }

    /// `1.5 - LOF`: higher is more normal.
    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        Ok(self
            .outlier_factor(data)?
            .into_iter()
            .map(|lof| 1.5 - lof)
            .collect())
    }

    fn score_samples(&self, data: &Table) -> EngineResult<Vec<f64>> {
        Ok(self
            .outlier_factor(data)?
            .into_iter()
            .map(|lof| -lof)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> Table {
        let mut rows = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                rows.push(vec![i as f64, j as f64]);
            }
        }
        Table::from_rows(rows).unwrap()
    }

    #[test]
    fn knn_distance_grows_away_from_data() {
        let mut nn = NearestNeighbor::new(NearestNeighborConfig { n_neighbors: 1 });
        nn.fit(&grid()).unwrap();
        let query = Table::from_rows(vec![vec![2.0, 2.0], vec![2.0, 12.0]]).unwrap();
        let scores = nn.decision_function(&query).unwrap();
        assert_relative_eq!(scores[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(scores[1], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn knn_clamps_neighbours_to_training_size() {
        let mut nn = NearestNeighbor::new(NearestNeighborConfig { n_neighbors: 50 });
        let train = Table::from_rows(vec![vec![0.0], vec![2.0]]).unwrap();
        nn.fit(&train).unwrap();
        let scores = nn.decision_function(&Table::from_column(vec![1.0])).unwrap();
        assert_relative_eq!(scores[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn lof_of_inliers_is_near_one() {
        let mut lof = LocalOutlierFactor::new(LofConfig { n_neighbors: 4 });
        lof.fit(&grid()).unwrap();
        let factors = lof
            .outlier_factor(&Table::from_rows(vec![vec![2.0, 2.0], vec![20.0, 20.0]]).unwrap())
            .unwrap();
        assert!((factors[0] - 1.0).abs() < 0.3, "inlier lof {}", factors[0]);
        assert!(factors[1] > 5.0, "outlier lof {}", factors[1]);
    }

    #[test]
    fn lof_decision_is_offset_negated_factor() {
        let mut lof = LocalOutlierFactor::new(LofConfig::default());
        lof.fit(&grid()).unwrap();
        let q = Table::from_rows(vec![vec![9.0, 9.0]]).unwrap();
        let factor = lof.outlier_factor(&q).unwrap()[0];
        assert_relative_eq!(lof.decision_function(&q).unwrap()[0], 1.5 - factor, epsilon = 1e-12);
        assert_relative_eq!(lof.score_samples(&q).unwrap()[0], -factor, epsilon = 1e-12);
    }

    #[test]
    fn lof_needs_two_samples() {
        let mut lof = LocalOutlierFactor::new(LofConfig::default());
        assert!(matches!(
            lof.fit(&Table::from_column(vec![1.0])),
            Err(EngineError::InsufficientData { needed: 2, got: 1 })
        ));
    }

    #[test]
    fn zero_neighbours_is_rejected() {
        assert!(NearestNeighborConfig { n_neighbors: 0 }.validate().is_err());
        assert!(LofConfig { n_neighbors: 0 }.validate().is_err());
    }
}
