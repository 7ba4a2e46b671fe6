//! Turns raw per-window scores into anomaly indicators and labels.
//!
//! The indicator is a continuous margin: positive means anomalous. Labels
//! are `-1.0` for anomalous and `1.0` for normal windows.

use crate::engine::stats;
use crate::engine::window::{ewm_mean, ewm_var, rolling_apply, rolling_mean, rolling_median, rolling_std};
use crate::error::{EngineError, EngineResult};
use crate::params::{ScoreOutput, ScoringMethod, ScoringRule};

const OTSU_BINS: usize = 64;

/// Label of an anomalous window.
pub const ANOMALY: f64 = -1.0;
/// Label of a normal window.
pub const NORMAL: f64 = 1.0;

fn scale(x: f64) -> f64 {
    if x.is_finite() && x > 1e-12 {
        x
    } else {
        1e-12
    }
}

/// Map indicators to labels. NaN indicators are normal.
pub fn labels(indicator: &[f64]) -> Vec<f64> {
    indicator
        .iter()
        .map(|&v| if v > 0.0 { ANOMALY } else { NORMAL })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Moments {
    mean: f64,
    std: f64,
}

impl Moments {
    fn of(values: &[f64]) -> Self {
        let std = stats::std_dev(values);
        Self {
            mean: stats::mean(values),
            std: if std.is_finite() { std } else { 0.0 },
        }
    }

    fn z(&self, s: f64) -> f64 {
        (s - self.mean) / scale(self.std)
    }
}

/// A scoring method calibrated on training scores.
#[derive(Debug, Clone)]
pub struct Scorer {
    method: ScoringMethod,
    threshold: f64,
    window: usize,
    reference: Vec<f64>,
    moments: Moments,
    tail: Vec<f64>,
}

impl Scorer {
    pub fn fit(
        method: ScoringMethod,
        threshold: u32,
        observation_window: usize,
        training: &[f64],
    ) -> EngineResult<Self> {
        let reference: Vec<f64> = training.iter().copied().filter(|v| v.is_finite()).collect();
        if reference.is_empty() {
            return Err(EngineError::ComputationError(
                "no finite training scores to calibrate the scoring method".into(),
            ));
        }
        let window = observation_window.max(1);
        let tail = reference[reference.len().saturating_sub(window)..].to_vec();
        Ok(Self {
            method,
            threshold: f64::from(threshold),
            window,
            moments: Moments::of(&reference),
            reference,
            tail,
        })
    }

    pub fn method(&self) -> ScoringMethod {
        self.method
    }

    /// Training scores the thresholds were estimated from.
    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    /// Scores or labels, depending on the method's output form.
    pub fn predict(&self, scores: &[f64]) -> Vec<f64> {
        let indicator = self.indicator(scores);
        if self.method.is_labelling() {
            labels(&indicator)
        } else {
            indicator
        }
    }

    /// Continuous anomaly margin per score.
    pub fn indicator(&self, scores: &[f64]) -> Vec<f64> {
        let oneshot = self.method.output() == ScoreOutput::OneShotLabel;
        let reference: &[f64] = if oneshot { scores } else { &self.reference };
        let t = self.threshold;

        match self.method.rule() {
            ScoringRule::Otsu => subtract(scores, stats::otsu_threshold(reference, OTSU_BINS)),
            ScoringRule::Contamination => {
                subtract(scores, stats::quantile(reference, self.percentile()))
            }
            ScoringRule::AdaptiveContamination => self.adaptive_contamination(scores, oneshot),
            ScoringRule::QFunction => {
                let moments = Moments::of(reference);
                scores
                    .iter()
                    .map(|&s| stats::surprise(stats::normal_sf(moments.z(s))) - t)
                    .collect()
            }
            ScoringRule::MedianAbsoluteDev => {
                let mad = stats::scaled_mad(reference);
                let mad = if mad.is_finite() { mad } else { 0.0 };
                subtract(scores, stats::median(reference) + t * mad)
            }
            ScoringRule::Std => {
                let moments = Moments::of(reference);
                subtract(scores, moments.mean + t * moments.std)
            }
            ScoringRule::Max => {
                let max = reference.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                subtract(scores, max)
            }
            ScoringRule::Iid => scores
                .iter()
                .map(|&s| self.moments.z(s).abs() - t)
                .collect(),
            ScoringRule::QScore => scores
                .iter()
                .map(|&s| {
                    let p = (2.0 * stats::normal_sf(self.moments.z(s).abs())).min(1.0);
                    stats::surprise(p) - t
                })
                .collect(),
            ScoringRule::ChiSquare => self.chi_square(scores),
            ScoringRule::SlidingWindow => self.sliding_window(scores),
            ScoringRule::AdaptiveSlidingWindow => self.adaptive_sliding_window(scores),
            ScoringRule::ContextualAnomaly => self.contextual(scores),
        }
    }

    fn percentile(&self) -> f64 {
        (100.0 - self.threshold) / 100.0
    }

    /// Training tail followed by the batch, and the batch offset inside it.
    fn with_context(&self, scores: &[f64]) -> (Vec<f64>, usize) {
        let mut series = self.tail.clone();
        series.extend_from_slice(scores);
        (series, self.tail.len())
    }

    fn adaptive_contamination(&self, scores: &[f64], oneshot: bool) -> Vec<f64> {
        let (series, offset) = if oneshot {
            (scores.to_vec(), 0)
        } else {
            self.with_context(scores)
        };
        let q = self.percentile();
        let rolling = rolling_apply(&series, self.window, |w| stats::quantile(w, q));
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let j = offset + i;
                let thr = match j.checked_sub(1).map(|k| rolling[k]) {
                    Some(v) if v.is_finite() => v,
                    _ if j > 0 => stats::quantile(&series[..j], q),
                    _ => return 0.0,
                };
                s - thr
            })
            .collect()
    }

    fn chi_square(&self, scores: &[f64]) -> Vec<f64> {
        let (series, offset) = self.with_context(scores);
        let z2: Vec<f64> = series.iter().map(|&s| self.moments.z(s).powi(2)).collect();
        (0..scores.len())
            .map(|i| {
                let end = offset + i + 1;
                let start = end.saturating_sub(self.window);
                let statistic: f64 = z2[start..end].iter().sum();
                stats::surprise(stats::chi_square_sf(statistic, end - start)) - self.threshold
            })
            .collect()
    }

    fn sliding_window(&self, scores: &[f64]) -> Vec<f64> {
        let (series, offset) = self.with_context(scores);
        let means = rolling_mean(&series, self.window);
        let stds = rolling_std(&series, self.window);
        self.contextual_z(scores, offset, |k| (means[k], stds[k]))
    }

    fn adaptive_sliding_window(&self, scores: &[f64]) -> Vec<f64> {
        let (series, offset) = self.with_context(scores);
        let alpha = 2.0 / (self.window as f64 + 1.0);
        let means = ewm_mean(&series, alpha);
        let vars = ewm_var(&series, alpha);
        self.contextual_z(scores, offset, |k| (means[k], vars[k].sqrt()))
    }

    fn contextual(&self, scores: &[f64]) -> Vec<f64> {
        let (series, offset) = self.with_context(scores);
        let medians = rolling_median(&series, self.window);
        let mads = rolling_apply(&series, self.window, stats::scaled_mad);
        self.contextual_z(scores, offset, |k| (medians[k], mads[k]))
    }

    /// `|z| - t` with location and scale taken from the window just before
    /// each score, falling back to the training moments.
    fn contextual_z<F>(&self, scores: &[f64], offset: usize, context: F) -> Vec<f64>
    where
        F: Fn(usize) -> (f64, f64),
    {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let (loc, spread) = match (offset + i).checked_sub(1).map(&context) {
                    Some((loc, spread)) if loc.is_finite() && spread.is_finite() => (loc, spread),
                    _ => (self.moments.mean, self.moments.std),
                };
                ((s - loc) / scale(spread)).abs() - self.threshold
            })
            .collect()
    }
}

fn subtract(scores: &[f64], threshold: f64) -> Vec<f64> {
    scores.iter().map(|s| s - threshold).collect()
}
