//! # Series Math
//!
//! Numeric primitives for time series feature engineering.
//! This crate provides first differences, lags, rolling windows, fill
//! policies and NaN-safe summary statistics.
//!
//! Missing observations are carried as `None` (a `NaN` inside `Some` is
//! treated as missing as well) so the caller decides how gaps are filled.

use thiserror::Error;

pub mod fill;
pub mod rolling;
pub mod stats;

pub use fill::{apply_fill_chain, backfill, fill_constant, forward_fill, FillPolicy};
pub use rolling::{diff, rolling_mean, rolling_std, shift, RollingWindow};
pub use stats::{max, mean, min, population_std, sample_std, sanitize, sanitize_or};

/// Errors that can occur in series calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for series math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Returns the value when it is present and not NaN.
#[inline]
pub fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_treats_nan_as_missing() {
        assert_eq!(present(Some(1.5)), Some(1.5));
        assert_eq!(present(Some(f64::NAN)), None);
        assert_eq!(present(None), None);
        assert_eq!(present(Some(f64::INFINITY)), Some(f64::INFINITY));
    }
}
