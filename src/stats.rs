//! Statistical helpers for noise estimation and rate-distortion curves.
//!
//! - [`Summary`]: population moments and range of a sample
//! - [`median`], [`median_absolute_deviation`]: robust location and spread,
//!   used by the blind sigma estimator
//! - [`bd_rate`]: Bjontegaard delta rate between two RD curves

use serde::{Deserialize, Serialize};

/// Population statistics of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation (`N` denominator).
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl Summary {
    /// Summarize `values`, or `None` if the slice is empty.
    #[must_use]
    pub fn compute(values: &[f64]) -> Option<Self> {
        let (&first, _) = values.split_first()?;
        let count = values.len();
        let n = count as f64;

        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        Some(Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        })
    }
}

/// Median of `values`; the mean of the two middle values for even lengths.
///
/// Returns 0.0 for an empty slice.
///
/// ```
/// use vst_eval::stats::median;
///
/// assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
/// assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
/// ```
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    let mut scratch = values.to_vec();
    median_in_place(&mut scratch)
}

fn median_in_place(values: &mut [f64]) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    let mid = len / 2;
    let (below, &mut upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    if len % 2 == 1 {
        return upper;
    }
    let lower = below.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lower + upper) / 2.0
}

/// Median absolute deviation from the median (unscaled).
///
/// Returns 0.0 for an empty slice.
///
/// ```
/// use vst_eval::stats::median_absolute_deviation;
///
/// // median = 3, |x - 3| = [2, 1, 0, 1, 97] -> median 1
/// assert_eq!(median_absolute_deviation(&[1.0, 2.0, 3.0, 4.0, 100.0]), 1.0);
/// ```
#[must_use]
pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(values);
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median_in_place(&mut deviations)
}

/// Bjontegaard delta rate of `test` against `reference`, in percent.
///
/// Points are `(rate, quality)`. Both curves are interpolated piecewise
/// linearly in `(quality, log10 rate)` and the mean log-rate gap over the
/// shared quality interval is reported. Negative means `test` needs fewer
/// bits for the same quality.
///
/// `None` when either curve has fewer than four points, a non-positive or
/// non-finite value, or the quality ranges don't overlap.
#[must_use]
pub fn bd_rate(reference: &[(f64, f64)], test: &[(f64, f64)]) -> Option<f64> {
    let reference = log_rate_curve(reference)?;
    let test = log_rate_curve(test)?;

    let low = reference.first()?.0.max(test.first()?.0);
    let high = reference.last()?.0.min(test.last()?.0);
    if low >= high {
        return None;
    }

    let span = high - low;
    let gap = (area_under(&test, low, high) - area_under(&reference, low, high)) / span;
    Some((10_f64.powf(gap) - 1.0) * 100.0)
}

/// `(quality, log10 rate)` sorted by quality.
fn log_rate_curve(points: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    if points.len() < 4 {
        return None;
    }
    let mut curve = Vec::with_capacity(points.len());
    for &(rate, quality) in points {
        if !(rate.is_finite() && rate > 0.0 && quality.is_finite()) {
            return None;
        }
        curve.push((quality, rate.log10()));
    }
    curve.sort_by(|a, b| a.0.total_cmp(&b.0));
    Some(curve)
}

/// Trapezoidal area under a piecewise linear curve, clipped to `[low, high]`.
fn area_under(curve: &[(f64, f64)], low: f64, high: f64) -> f64 {
    curve
        .windows(2)
        .filter_map(|pair| {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            let (a, b) = (x0.max(low), x1.min(high));
            if x1 <= x0 || b <= a {
                return None;
            }
            let at = |x: f64| y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            Some((at(a) + at(b)) / 2.0 * (b - a))
        })
        .sum()
}
