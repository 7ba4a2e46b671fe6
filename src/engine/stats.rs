//! Statistical utility functions.

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the variance of a slice (sample variance with n-1 denominator).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Calculate the standard deviation of a slice.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Calculate the median of a slice, ignoring non-finite values.
pub fn median(values: &[f64]) -> f64 {
    let sorted = sorted_finite(values);
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Quantile with linear interpolation between order statistics.
///
/// `q` is clamped to `[0, 1]`; non-finite values are ignored.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median absolute deviation, scaled to be consistent with the standard
/// deviation under normality (factor 1.4826).
pub fn scaled_mad(values: &[f64]) -> f64 {
    let med = median(values);
    if med.is_nan() {
        return f64::NAN;
    }
    let deviations: Vec<f64> = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - med).abs())
        .collect();
    1.4826 * median(&deviations)
}

/// Otsu's threshold over a fixed-bin histogram.
///
/// Returns the upper edge of the bin that maximises the between-class
/// variance. A constant input returns that constant.
pub fn otsu_threshold(values: &[f64], bins: usize) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bins = bins.max(2);
    if max - min < 1e-12 {
        return max;
    }

    let width = (max - min) / bins as f64;
    let mut histogram = vec![0.0_f64; bins];
    for &x in &finite {
        let bin = (((x - min) / width) as usize).min(bins - 1);
        histogram[bin] += 1.0;
    }

    let total = finite.len() as f64;
    let sum_total: f64 = histogram.iter().enumerate().map(|(i, h)| i as f64 * h).sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best_bin = 0;
    let mut best_between = -1.0;

    for (t, &h) in histogram.iter().enumerate() {
        weight_bg += h;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * h;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_total - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_between {
            best_between = between;
            best_bin = t;
        }
    }

    min + (best_bin + 1) as f64 * width
}

/// Upper tail probability of the standard normal, `Q(z) = 1 - Φ(z)`.
pub fn normal_sf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(dist) => dist.sf(z),
        Err(_) => f64::NAN,
    }
}

/// Upper tail probability of a chi-square distribution with `dof` degrees of freedom.
pub fn chi_square_sf(statistic: f64, dof: usize) -> f64 {
    if statistic.is_nan() || dof == 0 {
        return f64::NAN;
    }
    match ChiSquared::new(dof as f64) {
        Ok(dist) => dist.sf(statistic.max(0.0)),
        Err(_) => f64::NAN,
    }
}

/// `-log10(p)`, saturating for probabilities that underflow to zero.
pub fn surprise(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    -p.max(1e-300).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_and_variance() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-10);
        assert!(mean(&[]).is_nan());
        assert_relative_eq!(variance(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2.5, epsilon = 1e-10);
        assert!(variance(&[1.0]).is_nan());
        assert_relative_eq!(std_dev(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2.5_f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn median_calculates_correctly() {
        assert_relative_eq!(median(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-10);
        assert_relative_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5, epsilon = 1e-10);
        assert_relative_eq!(median(&[5.0, 1.0, f64::NAN, 3.0]), 3.0, epsilon = 1e-10);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&v, 0.0), 1.0, epsilon = 1e-10);
        assert_relative_eq!(quantile(&v, 0.5), 3.0, epsilon = 1e-10);
        assert_relative_eq!(quantile(&v, 0.875), 4.5, epsilon = 1e-10);
        assert_relative_eq!(quantile(&v, 2.0), 5.0, epsilon = 1e-10);
    }

    #[test]
    fn scaled_mad_of_symmetric_data() {
        // deviations from median 3: [2, 1, 0, 1, 2] -> median 1
        assert_relative_eq!(scaled_mad(&[1.0, 2.0, 3.0, 4.0, 5.0]), 1.4826, epsilon = 1e-10);
    }

    #[test]
    fn otsu_separates_two_clusters() {
        let mut values: Vec<f64> = (0..50).map(|i| 1.0 + 0.01 * i as f64).collect();
        values.extend((0..10).map(|i| 10.0 + 0.01 * i as f64));
        let t = otsu_threshold(&values, 64);
        assert!(t > 1.5 && t < 10.0, "threshold {t}");
    }

    #[test]
    fn otsu_constant_input() {
        assert_relative_eq!(otsu_threshold(&[2.0; 5], 64), 2.0, epsilon = 1e-12);
        assert!(otsu_threshold(&[], 64).is_nan());
    }

    #[test]
    fn tail_probabilities() {
        assert_relative_eq!(normal_sf(0.0), 0.5, epsilon = 1e-10);
        assert_relative_eq!(normal_sf(1.96), 0.025, epsilon = 1e-3);
        assert_relative_eq!(chi_square_sf(0.0, 3), 1.0, epsilon = 1e-10);
        assert!(chi_square_sf(20.0, 2) < 1e-4);
        assert_relative_eq!(surprise(0.01), 2.0, epsilon = 1e-10);
    }
}
