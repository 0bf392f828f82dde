//! Summary statistics and the numeric sanitising boundary
//!
//! All statistics return `NaN` when they are undefined (empty input, a
//! single observation for the sample deviation). Callers that need a
//! JSON-safe number pass the result through [`sanitize`].

use statrs::statistics::Statistics;

/// Arithmetic mean
pub fn mean(values: &[f64]) -> f64 {
    Statistics::mean(values.iter())
}

/// Sample standard deviation (denominator `n - 1`)
pub fn sample_std(values: &[f64]) -> f64 {
    Statistics::std_dev(values.iter())
}

/// Population standard deviation (denominator `n`)
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    Statistics::population_std_dev(values.iter())
}

/// Smallest value
pub fn min(values: &[f64]) -> f64 {
    Statistics::min(values.iter())
}

/// Largest value
pub fn max(values: &[f64]) -> f64 {
    Statistics::max(values.iter())
}

/// Replace `NaN` and infinities with `0.0`
#[inline]
pub fn sanitize(value: f64) -> f64 {
    sanitize_or(value, 0.0)
}

/// Replace `NaN` and infinities with `default`
#[inline]
pub fn sanitize_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}
