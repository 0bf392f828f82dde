//! Forecast request and engine configuration

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use series_math::FillPolicy;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Spacing between consecutive forecast steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastInterval {
    /// One hour
    Hour,
    /// One day
    #[default]
    Day,
    /// Seven days
    Week,
    /// One calendar month (clamped to the last day of shorter months)
    Month,
}

impl ForecastInterval {
    /// Timestamp one interval after `from`
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ForecastInterval::Hour => from + Duration::hours(1),
            ForecastInterval::Day => from + Duration::days(1),
            ForecastInterval::Week => from + Duration::weeks(1),
            ForecastInterval::Month => from
                .checked_add_months(Months::new(1))
                .unwrap_or(from + Duration::days(30)),
        }
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastInterval::Hour => "hour",
            ForecastInterval::Day => "day",
            ForecastInterval::Week => "week",
            ForecastInterval::Month => "month",
        }
    }
}

impl FromStr for ForecastInterval {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hour" | "hourly" | "h" | "1h" => Ok(ForecastInterval::Hour),
            "day" | "daily" | "d" | "1d" => Ok(ForecastInterval::Day),
            "week" | "weekly" | "w" | "1w" => Ok(ForecastInterval::Week),
            "month" | "monthly" | "m" | "1m" => Ok(ForecastInterval::Month),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unsupported forecast interval: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ForecastInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence level of the forecast band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum ConfidenceLevel {
    /// 90%
    Ninety,
    /// 95%
    #[default]
    NinetyFive,
    /// 99%
    NinetyNine,
}

impl ConfidenceLevel {
    /// Map a percentage to a level; anything other than 90, 95 or 99 is 95
    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() {
            return ConfidenceLevel::NinetyFive;
        }
        match percent.trunc() as i64 {
            90 => ConfidenceLevel::Ninety,
            99 => ConfidenceLevel::NinetyNine,
            _ => ConfidenceLevel::NinetyFive,
        }
    }

    /// Two-sided normal quantile for this level
    pub fn z_score(&self) -> f64 {
        match self {
            ConfidenceLevel::Ninety => 1.645,
            ConfidenceLevel::NinetyFive => 1.96,
            ConfidenceLevel::NinetyNine => 2.576,
        }
    }

    /// Level as a percentage
    pub fn percent(&self) -> f64 {
        match self {
            ConfidenceLevel::Ninety => 90.0,
            ConfidenceLevel::NinetyFive => 95.0,
            ConfidenceLevel::NinetyNine => 99.0,
        }
    }
}

impl From<f64> for ConfidenceLevel {
    fn from(percent: f64) -> Self {
        ConfidenceLevel::from_percent(percent)
    }
}

impl From<ConfidenceLevel> for f64 {
    fn from(level: ConfidenceLevel) -> Self {
        level.percent()
    }
}

/// Parameters of one forecast run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of future steps
    pub horizon: usize,
    /// Spacing between steps
    pub interval: ForecastInterval,
    /// Confidence level of the band
    pub confidence_level: ConfidenceLevel,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 10,
            interval: ForecastInterval::Day,
            confidence_level: ConfidenceLevel::NinetyFive,
        }
    }
}

impl ForecastConfig {
    /// Create a validated configuration
    pub fn new(
        horizon: usize,
        interval: ForecastInterval,
        confidence_level: ConfidenceLevel,
    ) -> Result<Self> {
        let config = Self {
            horizon,
            interval,
            confidence_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the horizon is positive
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "Horizon must be a positive number of steps".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Tunable constants of the forecast engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of trailing differences used for the local volatility estimate
    pub volatility_window: usize,
    /// Half-width of the fallback band as a fraction of the repeated value
    pub fallback_band: f64,
    /// Fraction of the target's std used when the difference std is degenerate
    pub degenerate_std_fraction: f64,
    /// Number of trailing historical rows summarised in the metrics
    pub metrics_history_window: usize,
    /// Fill policies applied to engineered features before prediction
    pub fill_chain: Vec<FillPolicy>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            volatility_window: 20,
            fallback_band: 0.05,
            degenerate_std_fraction: 0.01,
            metrics_history_window: 50,
            fill_chain: vec![
                FillPolicy::Backward,
                FillPolicy::Forward,
                FillPolicy::Constant(0.0),
            ],
        }
    }
}

impl EngineSettings {
    /// Parse settings from JSON text; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        if settings.volatility_window == 0 {
            return Err(ForecastError::InvalidParameter(
                "volatility_window must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_advance_clamps() {
        let jan_31 = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let feb_29 = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(ForecastInterval::Month.advance(jan_31), feb_29);
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!(
            "Week".parse::<ForecastInterval>().unwrap(),
            ForecastInterval::Week
        );
        assert!(matches!(
            "fortnight".parse::<ForecastInterval>(),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_confidence_from_json_number() {
        let config = ForecastConfig::from_json_str(
            r#"{"horizon": 3, "interval": "hour", "confidence_level": 99}"#,
        )
        .unwrap();
        assert_eq!(config.confidence_level, ConfidenceLevel::NinetyNine);
        assert_eq!(config.interval, ForecastInterval::Hour);

        let fallback: ForecastConfig =
            serde_json::from_str(r#"{"confidence_level": 80}"#).unwrap();
        assert_eq!(fallback.confidence_level, ConfidenceLevel::NinetyFive);
        assert_eq!(fallback.horizon, 10);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        assert!(ForecastConfig::from_json_str(r#"{"horizon": 0}"#).is_err());
    }
}
