//! Prediction output of an operator.

use super::Table;
use serde::{Deserialize, Serialize};

/// Output of `predict`: one-dimensional scores/labels or a table of values.
///
/// The outer sequence is always over samples (windows for windowed
/// detectors, forecast steps for forecasters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    /// One value per sample.
    Vector(Vec<f64>),
    /// One row per sample.
    Matrix(Table),
}

impl Prediction {
    /// Outer-sample cardinality.
    pub fn len(&self) -> usize {
        match self {
            Prediction::Vector(v) => v.len(),
            Prediction::Matrix(t) => t.rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the values if this is a vector prediction.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Prediction::Vector(v) => Some(v),
            Prediction::Matrix(_) => None,
        }
    }

    /// Borrow the table if this is a matrix prediction.
    pub fn as_matrix(&self) -> Option<&Table> {
        match self {
            Prediction::Vector(_) => None,
            Prediction::Matrix(t) => Some(t),
        }
    }

    /// Convert into a vector; a matrix is flattened row-major.
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Prediction::Vector(v) => v,
            Prediction::Matrix(t) => t.into_vec(),
        }
    }
}

impl From<Vec<f64>> for Prediction {
    fn from(values: Vec<f64>) -> Self {
        Prediction::Vector(values)
    }
}

impl From<Table> for Prediction {
    fn from(table: Table) -> Self {
        Prediction::Matrix(table)
    }
}
