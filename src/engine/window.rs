//! Sliding windows over tabular data, the `Flatten` stage, and trailing
//! window statistics used by the scoring methods.

use crate::core::Table;
use crate::engine::pipeline::{Frame, Stage, StageKind};
use crate::engine::stats;
use crate::error::{EngineError, EngineResult};
use serde_json::json;

/// A batch of overlapping windows: `count × lookback × width`, time-major
/// inside each window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    count: usize,
    lookback: usize,
    width: usize,
    data: Vec<f64>,
}

impl WindowBatch {
    /// Number of windows.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Time steps per window.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Columns per time step.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Borrow window `index` as a flat `lookback * width` slice.
    pub fn window(&self, index: usize) -> &[f64] {
        let size = self.lookback * self.width;
        &self.data[index * size..(index + 1) * size]
    }

    /// One row per window, time-major.
    pub fn flatten(self) -> EngineResult<Table> {
        Table::new(self.count, self.lookback * self.width, self.data)
    }
}

/// Build every stride-1 window of `lookback` consecutive rows.
pub fn sliding_windows(data: &Table, lookback: usize) -> EngineResult<WindowBatch> {
    if lookback == 0 {
        return Err(EngineError::ComputationError(
            "window length must be at least 1".into(),
        ));
    }
    if data.rows() < lookback {
        return Err(EngineError::InsufficientData {
            needed: lookback,
            got: data.rows(),
        });
    }
    let count = data.rows() - lookback + 1;
    let width = data.cols();
    let mut buf = Vec::with_capacity(count * lookback * width);
    for start in 0..count {
        buf.extend_from_slice(&data.as_slice()[start * width..(start + lookback) * width]);
    }
    Ok(WindowBatch {
        count,
        lookback,
        width,
        data: buf,
    })
}

/// Flattens each window into a single feature row.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    shape: Option<(usize, usize)>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window shape `(lookback, width)` recorded at fit time.
    pub fn fitted_shape(&self) -> Option<(usize, usize)> {
        self.shape
    }
}

impl Stage for Flatten {
    fn name(&self) -> &'static str {
        "Flatten"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transformer
    }

    fn fit(&mut self, frame: &Frame) -> EngineResult<()> {
        self.shape = Some(match frame {
            Frame::Windows(batch) => (batch.lookback(), batch.width()),
            Frame::Table(table) => (1, table.cols()),
        });
        Ok(())
    }

    fn transform(&self, frame: Frame) -> EngineResult<Frame> {
        let (lookback, width) = self.shape.ok_or(EngineError::FitRequired)?;
        match frame {
            Frame::Windows(batch) => {
                if batch.lookback() * batch.width() != lookback * width {
                    return Err(EngineError::DimensionMismatch {
                        expected: lookback * width,
                        got: batch.lookback() * batch.width(),
                    });
                }
                Ok(Frame::Table(batch.flatten()?))
            }
            Frame::Table(table) => {
                if table.cols() != lookback * width {
                    return Err(EngineError::DimensionMismatch {
                        expected: lookback * width,
                        got: table.cols(),
                    });
                }
                Ok(Frame::Table(table))
            }
        }
    }

    fn describe(&self) -> serde_json::Value {
        json!({ "operator": "Flatten" })
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Compute the trailing rolling mean. Positions without a full window are NaN.
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(series, window, stats::mean)
}

/// Compute the trailing rolling standard deviation.
pub fn rolling_std(series: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; series.len()];
    }
    rolling_apply(series, window, stats::std_dev)
}

/// Compute the trailing rolling median.
pub fn rolling_median(series: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(series, window, stats::median)
}

/// Apply `f` to every full trailing window.
pub fn rolling_apply<F>(series: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || window > n {
        return result;
    }
    for i in (window - 1)..n {
        result[i] = f(&series[i + 1 - window..=i]);
    }
    result
}

/// Compute exponentially weighted moving average (EWMA).
///
/// # Arguments
/// * `series` - Input time series
/// * `alpha` - Smoothing factor (0 < alpha <= 1)
///   - alpha = 2/(span+1) for span-based specification
pub fn ewm_mean(series: &[f64], alpha: f64) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let mut result = Vec::with_capacity(series.len());
    let mut ewm = series[0];

    result.push(ewm);

    for &x in series.iter().skip(1) {
        ewm = alpha * x + (1.0 - alpha) * ewm;
        result.push(ewm);
    }

    result
}

/// Compute exponentially weighted moving variance.
pub fn ewm_var(series: &[f64], alpha: f64) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let ewm = ewm_mean(series, alpha);

    let mut result = Vec::with_capacity(series.len());
    let mut ewm_sq = series[0] * series[0];

    result.push(0.0); // First variance is 0

    for (i, &x) in series.iter().enumerate().skip(1) {
        ewm_sq = alpha * x * x + (1.0 - alpha) * ewm_sq;
        let var = ewm_sq - ewm[i] * ewm[i];
        result.push(var.max(0.0));
    }

    result
}
