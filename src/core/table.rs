//! Row-major tabular container for samples × features data.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// A dense two-dimensional table of samples (rows) by features (columns).
///
/// One-dimensional input is represented as a single-column table.
///
/// Serializes as an array of rows, matching the JSON input schemas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<f64>>", try_from = "Vec<Vec<f64>>")]
pub struct Table {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Table {
    /// Create a table from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> EngineResult<Self> {
        if data.len() != rows * cols {
            return Err(EngineError::DimensionMismatch {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a table from a list of rows. All rows must have the same width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len();
        let mut data = Vec::with_capacity(n * cols);
        for row in rows {
            if row.len() != cols {
                return Err(EngineError::DimensionMismatch {
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n,
            cols,
            data,
        })
    }

    /// Create a single-column table from a one-dimensional series.
    pub fn from_column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    /// Create a table from a list of columns. All columns must have the same length.
    pub fn from_columns(columns: &[Vec<f64>]) -> EngineResult<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for column in columns {
            if column.len() != rows {
                return Err(EngineError::DimensionMismatch {
                    expected: rows,
                    got: column.len(),
                });
            }
        }
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for column in columns {
                data.push(column[i]);
            }
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of rows (samples).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (features).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow a row.
    ///
    /// # Panics
    /// Panics if `index >= rows`.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        let cols = self.cols;
        (0..self.rows).map(move |i| &self.data[i * cols..(i + 1) * cols])
    }

    /// Copy out a column.
    pub fn column(&self, index: usize) -> EngineResult<Vec<f64>> {
        if index >= self.cols {
            return Err(EngineError::ColumnOutOfRange {
                index,
                width: self.cols,
            });
        }
        Ok(self.iter_rows().map(|r| r[index]).collect())
    }

    /// Get a single value.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Row-major backing data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Keep only the given columns, in the given order.
    pub fn select_columns(&self, indices: &[usize]) -> EngineResult<Table> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.cols) {
            return Err(EngineError::ColumnOutOfRange {
                index: bad,
                width: self.cols,
            });
        }
        let mut data = Vec::with_capacity(self.rows * indices.len());
        for row in self.iter_rows() {
            data.extend(indices.iter().map(|&i| row[i]));
        }
        Ok(Table {
            rows: self.rows,
            cols: indices.len(),
            data,
        })
    }

    /// Copy of rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.rows);
        let start = start.min(end);
        Table {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Append the rows of `other` below `self`.
    pub fn vstack(&self, other: &Table) -> EngineResult<Table> {
        if self.rows == 0 {
            return Ok(other.clone());
        }
        if other.rows == 0 {
            return Ok(self.clone());
        }
        if self.cols != other.cols {
            return Err(EngineError::DimensionMismatch {
                expected: self.cols,
                got: other.cols,
            });
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Ok(Table {
            rows: self.rows + other.rows,
            cols: self.cols,
            data,
        })
    }

    /// Whether all values are finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl From<Table> for Vec<Vec<f64>> {
    fn from(table: Table) -> Self {
        table.iter_rows().map(|r| r.to_vec()).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for Table {
    type Error = EngineError;

    fn try_from(rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        Table::from_rows(rows)
    }
}

impl From<Vec<f64>> for Table {
    fn from(values: Vec<f64>) -> Self {
        Table::from_column(values)
    }
}
