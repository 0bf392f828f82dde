//! Feature engineering over a target series
//!
//! Every engineered column has the same length as the input frame. Rows
//! without enough history for a window keep `None` so the caller picks the
//! fill policy: training-style preparation drops them, live prediction fills
//! them.

use crate::data::TimeSeriesFrame;
use crate::error::{ForecastError, Result};
use chrono::Datelike;
use series_math::{apply_fill_chain, diff, present, rolling_mean, rolling_std, shift, FillPolicy};

/// Lags applied to the first difference
pub const LAG_PERIODS: [usize; 6] = [1, 2, 3, 5, 7, 14];
/// Windows of the rolling mean of differences
pub const DIFF_MA_WINDOWS: [usize; 3] = [3, 7, 14];
/// Windows of the rolling mean of the target
pub const PRICE_MA_WINDOWS: [usize; 3] = [7, 14, 30];
/// Window of the rolling standard deviation of the target
pub const VOLATILITY_WINDOW: usize = 20;

/// Name of the first-difference column for a target
pub fn diff_column(target: &str) -> String {
    format!("{}_diff", target)
}

/// Builds lag, rolling, calendar and volatility features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBuilder {
    lag_periods: Vec<usize>,
    diff_ma_windows: Vec<usize>,
    price_ma_windows: Vec<usize>,
    volatility_window: usize,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            lag_periods: LAG_PERIODS.to_vec(),
            diff_ma_windows: DIFF_MA_WINDOWS.to_vec(),
            price_ma_windows: PRICE_MA_WINDOWS.to_vec(),
            volatility_window: VOLATILITY_WINDOW,
        }
    }
}

impl FeatureBuilder {
    /// Builder with the standard windows
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with custom windows
    pub fn with_windows(
        lag_periods: Vec<usize>,
        diff_ma_windows: Vec<usize>,
        price_ma_windows: Vec<usize>,
        volatility_window: usize,
    ) -> Result<Self> {
        let lags_ok = lag_periods.iter().all(|&l| l > 0);
        let windows_ok = diff_ma_windows
            .iter()
            .chain(price_ma_windows.iter())
            .all(|&w| w > 0);

        if !lags_ok || !windows_ok || volatility_window < 2 {
            return Err(ForecastError::InvalidParameter(
                "Lags and windows must be positive, volatility window at least 2".to_string(),
            ));
        }

        Ok(Self {
            lag_periods,
            diff_ma_windows,
            price_ma_windows,
            volatility_window,
        })
    }

    /// Engineered feature names in model order
    pub fn feature_names(&self, target: &str) -> Vec<String> {
        let mut names = vec![diff_column(target)];
        names.extend(self.lag_periods.iter().map(|l| format!("lag_diff_{}", l)));
        names.extend(self.diff_ma_windows.iter().map(|w| format!("ma_diff_{}", w)));
        names.extend(self.price_ma_windows.iter().map(|w| format!("ma_price_{}", w)));
        names.extend(
            ["day_of_week", "day_of_month", "month", "volatility"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }

    /// Derive the feature frame. Never fails; gaps stay `None`.
    ///
    /// The output carries every numeric source column followed by the
    /// engineered columns. A missing or non-numeric target yields engineered
    /// columns that are entirely undefined, except the calendar fields.
    pub fn build(&self, frame: &TimeSeriesFrame, target: &str) -> FeatureFrame {
        let rows = frame.len();
        let mut out = FeatureFrame::with_rows(rows);

        for column in frame.columns() {
            if let Some(values) = column.as_numeric() {
                out.push(column.name(), values.to_vec());
            }
        }

        let undefined = || vec![None; rows];
        let target_values: Vec<Option<f64>> = frame
            .numeric(target)
            .map(<[Option<f64>]>::to_vec)
            .unwrap_or_else(undefined);

        let diffs = diff(&target_values);
        out.push(&diff_column(target), diffs.clone());

        for &lag in &self.lag_periods {
            out.push(&format!("lag_diff_{}", lag), shift(&diffs, lag));
        }
        for &window in &self.diff_ma_windows {
            let values = rolling_mean(&diffs, window).unwrap_or_else(|_| undefined());
            out.push(&format!("ma_diff_{}", window), values);
        }
        for &window in &self.price_ma_windows {
            let values = rolling_mean(&target_values, window).unwrap_or_else(|_| undefined());
            out.push(&format!("ma_price_{}", window), values);
        }

        let (day_of_week, day_of_month, month) = match frame.timestamps() {
            Some(stamps) => (
                stamps
                    .iter()
                    .map(|t| Some(f64::from(t.weekday().num_days_from_monday())))
                    .collect(),
                stamps.iter().map(|t| Some(f64::from(t.day()))).collect(),
                stamps.iter().map(|t| Some(f64::from(t.month()))).collect(),
            ),
            None => (vec![Some(0.0); rows], vec![Some(1.0); rows], vec![Some(1.0); rows]),
        };
        out.push("day_of_week", day_of_week);
        out.push("day_of_month", day_of_month);
        out.push("month", month);

        let volatility =
            rolling_std(&target_values, self.volatility_window).unwrap_or_else(|_| undefined());
        out.push("volatility", volatility);

        out
    }
}

/// Column-oriented table of numeric features
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    rows: usize,
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl FeatureFrame {
    fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Create from named columns of equal length
    pub fn from_columns(columns: Vec<(String, Vec<Option<f64>>)>) -> Result<Self> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut frame = Self::with_rows(rows);
        for (name, values) in columns {
            if values.len() != rows {
                return Err(ForecastError::DataError(format!(
                    "Feature '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    rows
                )));
            }
            frame.push(&name, values);
        }
        Ok(frame)
    }

    // Later columns with an existing name replace the earlier one, so an
    // engineered column shadows a source column of the same name.
    fn push(&mut self, name: &str, values: Vec<Option<f64>>) {
        match self.names.iter().position(|n| n == name) {
            Some(i) => self.columns[i] = values,
            None => {
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Most recent value of a column
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.column(name)
            .and_then(|v| v.last().copied())
            .and_then(present)
    }

    /// Copy with every column passed through the fill chain
    pub fn fill_missing(&self, chain: &[FillPolicy]) -> Self {
        Self {
            rows: self.rows,
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| apply_fill_chain(c, chain))
                .collect(),
        }
    }

    /// Indices of rows where all the named columns are defined
    fn complete_rows(&self, names: &[String]) -> Vec<usize> {
        let selected: Vec<&[Option<f64>]> = names.iter().filter_map(|n| self.column(n)).collect();
        (0..self.rows)
            .filter(|&row| selected.iter().all(|c| present(c[row]).is_some()))
            .collect()
    }
}

/// Feature matrix and aligned target, with incomplete rows removed
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// Feature names, one per matrix column
    pub feature_names: Vec<String>,
    /// Row-major feature matrix
    pub features: Vec<Vec<f64>>,
    /// Target value of each row
    pub target: Vec<f64>,
}

impl TrainingSet {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.target.len()
    }

    /// Whether no rows survived
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Build features and keep only rows where every standard feature and the target is defined
pub fn prepare_training_data(
    builder: &FeatureBuilder,
    frame: &TimeSeriesFrame,
    target: &str,
) -> Result<TrainingSet> {
    let target_values = frame.target_values(target)?;
    let features = builder.build(frame, target);
    let feature_names: Vec<String> = builder
        .feature_names(target)
        .into_iter()
        .filter(|n| features.has_column(n))
        .collect();

    let mut required = feature_names.clone();
    required.push(target.to_string());

    let rows = features.complete_rows(&required);
    if rows.is_empty() {
        return Err(ForecastError::DataError(format!(
            "Not enough history in '{}' to build complete feature rows",
            target
        )));
    }

    let columns: Vec<&[Option<f64>]> = feature_names
        .iter()
        .filter_map(|n| features.column(n))
        .collect();

    Ok(TrainingSet {
        features: rows
            .iter()
            .map(|&row| columns.iter().map(|c| c[row].unwrap_or(0.0)).collect())
            .collect(),
        target: rows
            .iter()
            .map(|&row| target_values[row].unwrap_or(0.0))
            .collect(),
        feature_names,
    })
}
