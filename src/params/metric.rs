//! Distance metric domains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance applied to per-window deviation vectors at the final stage of a
/// windowed anomaly pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Mean squared deviation.
    #[default]
    #[serde(rename = "mse")]
    Mse,
    /// Euclidean norm of the deviation.
    #[serde(rename = "euclidean")]
    Euclidean,
    /// LogDet divergence between windowed and training deviation covariance.
    #[serde(rename = "logdet")]
    LogDet,
    /// Affine-invariant Riemannian distance between covariances.
    #[serde(rename = "riemannian")]
    Riemannian,
    /// Gaussian Kullback-Leibler divergence between covariances.
    #[serde(rename = "kullback")]
    Kullback,
    /// Mahalanobis distance against the training deviation covariance.
    #[serde(rename = "Mahalanobis_Distance")]
    Mahalanobis,
    /// Smallest absolute deviation component.
    #[serde(rename = "min")]
    Min,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 7] = [
        DistanceMetric::Mse,
        DistanceMetric::Euclidean,
        DistanceMetric::LogDet,
        DistanceMetric::Riemannian,
        DistanceMetric::Kullback,
        DistanceMetric::Mahalanobis,
        DistanceMetric::Min,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Mse => "mse",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::LogDet => "logdet",
            DistanceMetric::Riemannian => "riemannian",
            DistanceMetric::Kullback => "kullback",
            DistanceMetric::Mahalanobis => "Mahalanobis_Distance",
            DistanceMetric::Min => "min",
        }
    }

    /// Whether the metric compares covariance matrices over the observation window.
    pub fn is_matrix_metric(&self) -> bool {
        matches!(
            self,
            DistanceMetric::LogDet | DistanceMetric::Riemannian | DistanceMetric::Kullback
        )
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistanceMetric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown distance metric `{s}`"))
    }
}

/// Distance between a training Gaussian graphical model and a windowed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphDistance {
    #[default]
    #[serde(rename = "KL_Divergence")]
    KlDivergence,
    #[serde(rename = "Frobenius_Norm")]
    FrobeniusNorm,
    #[serde(rename = "Likelihood")]
    Likelihood,
    #[serde(rename = "Spectral")]
    Spectral,
    #[serde(rename = "Mahalanobis_Distance")]
    Mahalanobis,
}

impl GraphDistance {
    pub const ALL: [GraphDistance; 5] = [
        GraphDistance::KlDivergence,
        GraphDistance::FrobeniusNorm,
        GraphDistance::Likelihood,
        GraphDistance::Spectral,
        GraphDistance::Mahalanobis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphDistance::KlDivergence => "KL_Divergence",
            GraphDistance::FrobeniusNorm => "Frobenius_Norm",
            GraphDistance::Likelihood => "Likelihood",
            GraphDistance::Spectral => "Spectral",
            GraphDistance::Mahalanobis => "Mahalanobis_Distance",
        }
    }
}

impl fmt::Display for GraphDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphDistance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GraphDistance::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown graph distance `{s}`"))
    }
}
