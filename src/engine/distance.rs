//! Distance metrics that reduce per-window deviation vectors to raw scores.

use crate::engine::linalg::{self, Matrix};
use crate::error::{EngineError, EngineResult};
use crate::params::DistanceMetric;

/// Reference statistics for the matrix metrics, from the training deviations.
#[derive(Debug, Clone)]
struct Reference {
    second_moment: Matrix,
    inverse: Matrix,
    log_det: f64,
    factor: Matrix,
}

/// A distance metric fitted on training deviations.
#[derive(Debug, Clone)]
pub struct DeviationDistance {
    metric: DistanceMetric,
    observation_window: usize,
    inverse_covariance: Option<Matrix>,
    reference: Option<Reference>,
    /// Trailing training deviations, used as context for the first windows
    /// of a new batch.
    tail: Vec<Vec<f64>>,
}

impl DeviationDistance {
    pub fn fit(
        metric: DistanceMetric,
        observation_window: usize,
        deviations: &[Vec<f64>],
    ) -> EngineResult<Self> {
        if deviations.is_empty() {
            return Err(EngineError::EmptyData);
        }
        let window = observation_window.max(1);

        let inverse_covariance = if metric == DistanceMetric::Mahalanobis {
            let d = deviations[0].len();
            let table = crate::core::Table::new(
                deviations.len(),
                d,
                deviations.iter().flatten().copied().collect(),
            )?;
            let (_, cov) = linalg::covariance(&table);
            Some(linalg::inverse_spd(&linalg::regularize(&cov)).ok_or_else(|| {
                EngineError::ComputationError("deviation covariance is singular".into())
            })?)
        } else {
            None
        };

        let reference = if metric.is_matrix_metric() {
            let second_moment = linalg::regularize(&linalg::second_moment(deviations));
            let factor = linalg::cholesky(&second_moment).ok_or_else(|| {
                EngineError::ComputationError("deviation second moment is singular".into())
            })?;
            let inverse = linalg::inverse_spd(&second_moment).ok_or_else(|| {
                EngineError::ComputationError("deviation second moment is singular".into())
            })?;
            let log_det = 2.0 * (0..factor.len()).map(|i| factor[i][i].ln()).sum::<f64>();
            Some(Reference {
                second_moment,
                inverse,
                log_det,
                factor,
            })
        } else {
            None
        };

        let tail_start = deviations.len().saturating_sub(window - 1);
        Ok(Self {
            metric,
            observation_window: window,
            inverse_covariance,
            reference,
            tail: deviations[tail_start..].to_vec(),
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Raw score per deviation vector.
    ///
    /// With `with_context`, the matrix metrics may look back into the
    /// training tail for the first vectors of the batch.
    pub fn apply(&self, deviations: &[Vec<f64>], with_context: bool) -> Vec<f64> {
        match self.metric {
            DistanceMetric::Mse => deviations
                .iter()
                .map(|r| r.iter().map(|x| x * x).sum::<f64>() / r.len().max(1) as f64)
                .collect(),
            DistanceMetric::Euclidean => deviations
                .iter()
                .map(|r| r.iter().map(|x| x * x).sum::<f64>().sqrt())
                .collect(),
            DistanceMetric::Min => deviations
                .iter()
                .map(|r| r.iter().map(|x| x.abs()).fold(f64::INFINITY, f64::min))
                .map(|m| if m.is_finite() { m } else { 0.0 })
                .collect(),
            DistanceMetric::Mahalanobis => match &self.inverse_covariance {
                Some(inv) => deviations
                    .iter()
                    .map(|r| linalg::quad_form(inv, r).max(0.0).sqrt())
                    .collect(),
                None => vec![f64::NAN; deviations.len()],
            },
            DistanceMetric::LogDet | DistanceMetric::Riemannian | DistanceMetric::Kullback => {
                self.apply_matrix(deviations, with_context)
            }
        }
    }

    fn apply_matrix(&self, deviations: &[Vec<f64>], with_context: bool) -> Vec<f64> {
        let Some(reference) = &self.reference else {
            return vec![f64::NAN; deviations.len()];
        };
        let context: &[Vec<f64>] = if with_context { &self.tail } else { &[] };
        let series: Vec<&Vec<f64>> = context.iter().chain(deviations.iter()).collect();
        let offset = context.len();

        (0..deviations.len())
            .map(|i| {
                let end = offset + i + 1;
                let start = end.saturating_sub(self.observation_window);
                let window: Vec<Vec<f64>> = series[start..end].iter().map(|v| (*v).clone()).collect();
                let current = linalg::regularize(&linalg::second_moment(&window));
                self.matrix_distance(reference, &current)
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }

    fn matrix_distance(&self, reference: &Reference, current: &Matrix) -> Option<f64> {
        let d = current.len() as f64;
        match self.metric {
            DistanceMetric::LogDet => {
                let log_det = linalg::log_det_spd(current)?;
                let trace = linalg::trace_product(current, &reference.inverse);
                Some(trace - log_det + reference.log_det - d)
            }
            DistanceMetric::Kullback => {
                let current_inverse = linalg::inverse_spd(current)?;
                let forward = linalg::trace_product(&reference.inverse, current);
                let backward = linalg::trace_product(&current_inverse, &reference.second_moment);
                Some(0.5 * (forward + backward) - d)
            }
            DistanceMetric::Riemannian => {
                let whitened = linalg::whiten(&reference.factor, current);
                let eig = linalg::symmetric_eigen(&whitened);
                Some(
                    eig.values
                        .iter()
                        .map(|l| l.max(1e-300).ln().powi(2))
                        .sum::<f64>()
                        .sqrt(),
                )
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn training() -> Vec<Vec<f64>> {
        (0..40)
            .map(|i| {
                let t = i as f64;
                vec![(0.7 * t).sin(), (1.3 * t).cos()]
            })
            .collect()
    }

    #[test]
    fn vector_metrics() {
        let dist = DeviationDistance::fit(DistanceMetric::Mse, 10, &training()).unwrap();
        assert_relative_eq!(dist.apply(&[vec![3.0, 4.0]], true)[0], 12.5, epsilon = 1e-12);

        let dist = DeviationDistance::fit(DistanceMetric::Euclidean, 10, &training()).unwrap();
        assert_relative_eq!(dist.apply(&[vec![3.0, 4.0]], true)[0], 5.0, epsilon = 1e-12);

        let dist = DeviationDistance::fit(DistanceMetric::Min, 10, &training()).unwrap();
        assert_relative_eq!(dist.apply(&[vec![3.0, -0.5]], true)[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn mahalanobis_uses_training_covariance() {
        let dist = DeviationDistance::fit(DistanceMetric::Mahalanobis, 10, &training()).unwrap();
        let scores = dist.apply(&[vec![0.0, 0.0], vec![4.0, 4.0]], true);
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > 3.0);
    }

    #[test]
    fn matrix_metrics_are_small_on_training_like_data() {
        for metric in [
            DistanceMetric::LogDet,
            DistanceMetric::Riemannian,
            DistanceMetric::Kullback,
        ] {
            let dist = DeviationDistance::fit(metric, 40, &training()).unwrap();
            let same = dist.apply(&training(), false);
            let scaled: Vec<Vec<f64>> = training()
                .into_iter()
                .map(|r| r.into_iter().map(|x| 10.0 * x).collect())
                .collect();
            let far = dist.apply(&scaled, false);
            let last = same.len() - 1;
            assert!(same[last].abs() < 1e-3, "{metric}: {}", same[last]);
            assert!(far[last] > 1.0, "{metric}: {}", far[last]);
        }
    }

    #[test]
    fn empty_training_fails() {
        assert!(matches!(
            DeviationDistance::fit(DistanceMetric::Mse, 10, &[]),
            Err(EngineError::EmptyData)
        ));
    }
}
