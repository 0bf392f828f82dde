//! Summary statistics comparing recent history with a forecast

use crate::data::TimeSeriesFrame;
use crate::engine::ForecastStep;
use serde::{Deserialize, Serialize};
use series_math::{max, mean, min, present, sample_std, sanitize};

/// Forecast summary; every field is finite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean of the historical window
    pub historical_mean: f64,
    /// Sample standard deviation of the historical window
    pub historical_std: f64,
    /// Mean of the forecast values
    pub forecast_mean: f64,
    /// `[min, max]` of the forecast values
    pub forecast_range: [f64; 2],
    /// `[min lower bound, max upper bound]`
    pub confidence_range: [f64; 2],
}

impl ForecastMetrics {
    /// Summarise `historical_window` (usually the last rows of history) and the forecast steps.
    ///
    /// Missing historical values are skipped; undefined statistics become `0.0`.
    pub fn summarize(
        historical_window: &TimeSeriesFrame,
        steps: &[ForecastStep],
        target: &str,
    ) -> Self {
        let history: Vec<f64> = historical_window
            .numeric(target)
            .map(|values| values.iter().filter_map(|v| present(*v)).collect())
            .unwrap_or_default();

        let values: Vec<f64> = steps.iter().map(|s| s.value).collect();
        let lower: Vec<f64> = steps.iter().map(|s| s.lower_bound).collect();
        let upper: Vec<f64> = steps.iter().map(|s| s.upper_bound).collect();

        Self {
            historical_mean: sanitize(mean(&history)),
            historical_std: sanitize(sample_std(&history)),
            forecast_mean: sanitize(mean(&values)),
            forecast_range: [sanitize(min(&values)), sanitize(max(&values))],
            confidence_range: [sanitize(min(&lower)), sanitize(max(&upper))],
        }
    }
}
