//! Robust statistics shared by the sky, zeropoint and astrometry estimators.
//!
//! All functions work on `f64` samples and follow the numpy conventions the
//! calibration tables were tuned against: `std` is the population standard
//! deviation (ddof = 0), and the median of an even-length sample is the mean of
//! the two central values.

use std::cmp::Ordering;

/// Result of an iterative sigma clip.
#[derive(Debug, Clone)]
pub struct SigmaClip {
    /// Surviving samples, in their original order.
    pub kept: Vec<f64>,
    /// Lower bound used on the final pass.
    pub lower: f64,
    /// Upper bound used on the final pass.
    pub upper: f64,
}

/// Arithmetic mean. `NaN` for an empty sample.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. `NaN` for an empty sample.
pub fn std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Median. `NaN` for an empty sample.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    } else {
        sorted[n / 2]
    }
}

/// Root-mean-square about zero: `sqrt(mean(x²))`.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    (values.iter().map(|&v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Iterative sigma clip with symmetric bounds.
///
/// Each pass computes the mean and standard deviation of the current sample
/// and keeps values inside `[mean - low * std, mean + high * std]` (inclusive).
/// Iteration stops as soon as a pass removes nothing.
pub fn sigma_clip(values: &[f64], low: f64, high: f64) -> SigmaClip {
    let mut kept: Vec<f64> = values.to_vec();
    let mut lower = f64::NAN;
    let mut upper = f64::NAN;
    loop {
        if kept.is_empty() {
            break;
        }
        let m = mean(&kept);
        let s = std(&kept);
        lower = m - s * low;
        upper = m + s * high;
        let before = kept.len();
        kept.retain(|&v| v >= lower && v <= upper);
        if kept.len() == before {
            break;
        }
    }
    SigmaClip { kept, lower, upper }
}
