//! Iterative forecasting engine
//!
//! The engine extends a series one step at a time. Each step rebuilds the
//! features over the working copy, reconciles them with the model's schema,
//! predicts the next difference, derives a confidence band from recent
//! volatility and appends a synthetic row that the next step builds on.
//!
//! If the first step fails the run fails. Later failures repeat the previous
//! value with a fixed proportional band and are marked
//! [`StepProvenance::Fallback`].

use crate::artifact::{ModelArtifact, Predictor};
use crate::config::{EngineSettings, ForecastConfig, ForecastInterval};
use crate::data::TimeSeriesFrame;
use crate::error::{ForecastError, Result};
use crate::features::{prepare_training_data, FeatureBuilder};
use crate::metrics::ForecastMetrics;
use crate::schema::{prepare_features_for_prediction, reconcile};
use crate::utils::round_to;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use series_math::{diff, population_std, present, sample_std, sanitize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// How a step's value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepProvenance {
    /// Model prediction with a z-score band
    Model,
    /// Previous value repeated with the fallback band
    Fallback,
}

/// One forecast step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStep {
    /// Timestamp of the step
    pub date: DateTime<Utc>,
    /// Forecast value
    pub value: f64,
    /// Lower edge of the band
    pub lower_bound: f64,
    /// Upper edge of the band
    pub upper_bound: f64,
    /// Change from the previous step, or from the last observation for the first step
    pub diff_from_previous: f64,
    /// Model or fallback
    pub provenance: StepProvenance,
}

/// One presentation row of a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    /// 1-based step number
    pub period_index: usize,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Forecast value, 4 decimals
    pub forecast_value: f64,
    /// Change from the previous row (or the last observation), 6 decimals
    pub variation: f64,
    /// Lower confidence bound, 4 decimals
    pub lower_bound: f64,
    /// Upper confidence bound, 4 decimals
    pub upper_bound: f64,
}

/// Result of a forecast run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    steps: Vec<ForecastStep>,
    base_value: f64,
    interval: ForecastInterval,
}

impl Forecast {
    fn new(steps: Vec<ForecastStep>, base_value: f64, interval: ForecastInterval) -> Self {
        let mut forecast = Self {
            steps,
            base_value,
            interval,
        };

        let mut previous = base_value;
        for step in &mut forecast.steps {
            step.diff_from_previous = sanitize(step.value - previous);
            previous = step.value;
        }

        forecast
    }

    /// Steps in date order
    pub fn steps(&self) -> &[ForecastStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Last historical target value the forecast starts from
    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Interval between steps
    pub fn interval(&self) -> ForecastInterval {
        self.interval
    }

    /// Number of steps produced by the fallback path
    pub fn fallback_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.provenance == StepProvenance::Fallback)
            .count()
    }

    /// Step dates
    pub fn dates(&self) -> Vec<DateTime<Utc>> {
        self.steps.iter().map(|s| s.date).collect()
    }

    /// Step values
    pub fn values(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.value).collect()
    }

    /// Rows for presentation, rounded and NaN-free
    pub fn rows(&self) -> Vec<ForecastRow> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| ForecastRow {
                period_index: i + 1,
                date: step.date.format("%Y-%m-%d").to_string(),
                forecast_value: round_to(step.value, 4),
                variation: round_to(step.diff_from_previous, 6),
                lower_bound: round_to(step.lower_bound, 4),
                upper_bound: round_to(step.upper_bound, 4),
            })
            .collect()
    }
}

/// Forecast rows plus their summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    /// One row per forecast step
    pub rows: Vec<ForecastRow>,
    /// Summary of the history window and the forecast
    pub metrics: ForecastMetrics,
}

/// Drives the step-by-step forecast
#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    settings: EngineSettings,
    builder: FeatureBuilder,
}

/// State shared by every step of one run
struct RunContext<'a> {
    artifact: &'a ModelArtifact,
    target: &'a str,
    config: &'a ForecastConfig,
    initial_std: f64,
}

impl ForecastEngine {
    /// Create an engine with the standard feature windows
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            builder: FeatureBuilder::default(),
        }
    }

    /// Use a custom feature builder
    pub fn with_builder(mut self, builder: FeatureBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Engine constants
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Feature builder in use
    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    /// Forecast `config.horizon` steps beyond the end of `historical`.
    ///
    /// `historical` is not modified; the run extends a private copy.
    pub fn run(
        &self,
        artifact: &ModelArtifact,
        historical: &TimeSeriesFrame,
        target: &str,
        config: &ForecastConfig,
    ) -> Result<Forecast> {
        config.validate()?;

        historical
            .target_values(target)
            .map_err(|e| ForecastError::ForecastingError(e.to_string()))?;

        // Anchor the run at the last row with a defined target
        let anchored = historical.trim_to_last_present(target).ok_or_else(|| {
            ForecastError::ForecastingError(format!(
                "Target column '{}' has no values to forecast from",
                target
            ))
        })?;
        if anchored.len() < historical.len() {
            warn!(
                "Ignoring {} trailing rows without a '{}' value",
                historical.len() - anchored.len(),
                target
            );
        }

        let target_values = anchored.target_values(target)?;
        let observed: Vec<f64> = target_values.iter().filter_map(|v| present(*v)).collect();
        let base_value = sanitize(anchored.last_value(target).unwrap_or_default());

        self.report_compatibility(artifact, &anchored, target);

        let context = RunContext {
            artifact,
            target,
            config,
            initial_std: self.initial_std(target_values, &observed),
        };

        let mut working = anchored;
        let mut steps: Vec<ForecastStep> = Vec::with_capacity(config.horizon);

        for i in 1..=config.horizon {
            match self.step(&context, &mut working, i) {
                Ok(step) => {
                    debug!(
                        "Step {}: {} = {:.4} [{:.4}, {:.4}]",
                        i, target, step.value, step.lower_bound, step.upper_bound
                    );
                    steps.push(step);
                }
                Err(e) if i == 1 => {
                    return Err(ForecastError::ForecastingError(format!(
                        "First forecasting step failed: {}",
                        e
                    )));
                }
                Err(e) => {
                    warn!("Step {} failed, repeating previous value: {}", i, e);
                    let step = self.fallback_step(&context, &mut working, &steps, i)?;
                    steps.push(step);
                }
            }
        }

        let forecast = Forecast::new(steps, base_value, config.interval);
        if forecast.fallback_count() > 0 {
            warn!(
                "{} of {} steps used the fallback path",
                forecast.fallback_count(),
                forecast.len()
            );
        }

        Ok(forecast)
    }

    /// Summary statistics of a forecast against the recent history
    pub fn summarize(
        &self,
        historical: &TimeSeriesFrame,
        forecast: &Forecast,
        target: &str,
    ) -> ForecastMetrics {
        let window = historical.tail(self.settings.metrics_history_window);
        ForecastMetrics::summarize(&window, forecast.steps(), target)
    }

    // Population std of the historical differences, or a fraction of the
    // target's sample std when that is degenerate, or 1.0.
    fn initial_std(&self, target_values: &[Option<f64>], observed: &[f64]) -> f64 {
        let diffs: Vec<f64> = diff(target_values).into_iter().flatten().collect();
        let std = population_std(&diffs);
        if std.is_finite() && std != 0.0 {
            return std;
        }

        let target_std = sample_std(observed);
        if target_std.is_finite() && target_std > 0.0 {
            target_std * self.settings.degenerate_std_fraction
        } else {
            1.0
        }
    }

    fn report_compatibility(&self, artifact: &ModelArtifact, historical: &TimeSeriesFrame, target: &str) {
        match prepare_training_data(&self.builder, historical, target) {
            Ok(training) => {
                let report = reconcile(
                    artifact.feature_names(),
                    training.feature_names.as_slice(),
                    None,
                );
                for warning in &report.warnings {
                    warn!("{}", warning);
                }
            }
            Err(e) => debug!("Skipping compatibility check: {}", e),
        }
    }

    fn step(
        &self,
        context: &RunContext<'_>,
        working: &mut TimeSeriesFrame,
        i: usize,
    ) -> Result<ForecastStep> {
        let expected = context.artifact.feature_names();

        let features = self
            .builder
            .build(working, context.target)
            .fill_missing(&self.settings.fill_chain);

        let report = reconcile(expected, features.names(), Some(&features));
        for warning in &report.warnings {
            if i == 1 {
                warn!("{}", warning);
            } else {
                debug!("{}", warning);
            }
        }

        let prepared = prepare_features_for_prediction(
            &features,
            expected,
            Some(&*working),
            Some(context.target),
        );

        let predicted_diff = if prepared.is_empty() {
            0.0
        } else {
            let row: Vec<f64> = expected
                .iter()
                .map(|name| prepared.latest(name).unwrap_or(0.0))
                .collect();
            let raw = predict_guarded(context.artifact.predictor(), &row)?;
            if !raw.is_finite() {
                warn!("Step {}: prediction {} replaced by 0.0", i, raw);
            }
            sanitize(raw)
        };

        let last_value = working.last_value(context.target).ok_or_else(|| {
            ForecastError::DataError(format!("No last value for '{}'", context.target))
        })?;
        let last_value = sanitize(last_value);

        let volatility = self.local_volatility(working, context.target, context.initial_std);
        let margin = sanitize(context.config.confidence_level.z_score() * volatility);

        let mut value = last_value + predicted_diff;
        if !value.is_finite() {
            value = last_value;
        }

        let date = next_date(working, context.config.interval, i);
        working.append_carried_row(date, context.target, value)?;

        Ok(ForecastStep {
            date,
            value,
            lower_bound: sanitize(value - margin),
            upper_bound: sanitize(value + margin),
            diff_from_previous: 0.0,
            provenance: StepProvenance::Model,
        })
    }

    fn fallback_step(
        &self,
        context: &RunContext<'_>,
        working: &mut TimeSeriesFrame,
        steps: &[ForecastStep],
        i: usize,
    ) -> Result<ForecastStep> {
        let value = match steps.last() {
            Some(previous) => previous.value,
            None => sanitize(working.last_value(context.target).unwrap_or(0.0)),
        };
        let date = match steps.last() {
            Some(previous) if working.is_datetime_indexed() => {
                context.config.interval.advance(previous.date)
            }
            _ => next_date(working, context.config.interval, i),
        };

        // Keep the working copy in step so later dates stay one interval apart
        if let Err(e) = working.append_carried_row(date, context.target, value) {
            debug!("Fallback row not appended: {}", e);
        }

        let band = self.settings.fallback_band;
        let (a, b) = (value * (1.0 - band), value * (1.0 + band));

        Ok(ForecastStep {
            date,
            value,
            lower_bound: sanitize(a.min(b)),
            upper_bound: sanitize(a.max(b)),
            diff_from_previous: 0.0,
            provenance: StepProvenance::Fallback,
        })
    }

    // Population std of the last `volatility_window` differences
    fn local_volatility(&self, working: &TimeSeriesFrame, target: &str, initial_std: f64) -> f64 {
        let diffs: Vec<f64> = working
            .numeric(target)
            .map(|values| diff(values).into_iter().flatten().collect())
            .unwrap_or_default();

        if diffs.is_empty() {
            return initial_std;
        }

        let start = diffs.len().saturating_sub(self.settings.volatility_window);
        let std = population_std(&diffs[start..]);
        if std.is_finite() && std != 0.0 {
            std
        } else {
            initial_std
        }
    }
}

fn next_date(working: &TimeSeriesFrame, interval: ForecastInterval, i: usize) -> DateTime<Utc> {
    match working.last_timestamp() {
        Some(last) => interval.advance(last),
        None => Utc::now() + Duration::days(i as i64),
    }
}

fn predict_guarded(predictor: &dyn Predictor, row: &[f64]) -> Result<f64> {
    match catch_unwind(AssertUnwindSafe(|| predictor.predict(row))) {
        Ok(result) => result,
        Err(_) => Err(ForecastError::PredictionError(format!(
            "{} panicked during prediction",
            predictor.name()
        ))),
    }
}
