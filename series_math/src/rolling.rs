//! Rolling window calculations
//!
//! Contains the windowed transforms used to derive features from a series:
//! - First differences
//! - Lags (shifts)
//! - Rolling mean
//! - Rolling sample standard deviation
//!
//! A window value is only defined once the window holds `period`
//! observations and none of them is missing.

use crate::stats::{mean, sample_std};
use crate::{present, MathError, Result};
use std::collections::VecDeque;

/// Fixed-size window over a stream of optional observations
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<Option<f64>>,
}

impl RollingWindow {
    /// Create a new rolling window with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
        })
    }

    /// Push a new observation, evicting the oldest one once the window is full
    pub fn update(&mut self, value: Option<f64>) {
        self.values.push_back(present(value));

        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    /// Whether the window holds `period` observations
    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    /// Window contents when full and free of missing values
    fn complete(&self) -> Option<Vec<f64>> {
        if !self.is_full() {
            return None;
        }
        self.values.iter().copied().collect()
    }

    /// Mean of the window
    pub fn mean(&self) -> Option<f64> {
        self.complete().map(|values| mean(&values))
    }

    /// Sample standard deviation of the window (undefined for a period of 1)
    pub fn std_dev(&self) -> Option<f64> {
        self.complete()
            .map(|values| sample_std(&values))
            .filter(|v| !v.is_nan())
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the window, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// First difference: `out[t] = values[t] - values[t - 1]`, undefined at `t = 0`
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;

    for (i, value) in values.iter().enumerate() {
        let current = present(*value);
        out.push(match (i, previous, current) {
            (0, _, _) => None,
            (_, Some(p), Some(c)) => Some(c - p),
            _ => None,
        });
        previous = current;
    }

    out
}

/// Lag a series by `periods`: `out[t] = values[t - periods]`
pub fn shift(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            if t >= periods {
                present(values[t - periods])
            } else {
                None
            }
        })
        .collect()
}

/// Rolling mean over `window` observations
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let mut rolling = RollingWindow::new(window)?;
    Ok(values
        .iter()
        .map(|value| {
            rolling.update(*value);
            rolling.mean()
        })
        .collect())
}

/// Rolling sample standard deviation over `window` observations
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let mut rolling = RollingWindow::new(window)?;
    Ok(values
        .iter()
        .map(|value| {
            rolling.update(*value);
            rolling.std_dev()
        })
        .collect())
}
