//! Feature schema reconciliation between a model and live data

use crate::data::TimeSeriesFrame;
use crate::features::FeatureFrame;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of comparing expected and produced feature names
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SchemaReport {
    /// True when nothing expected is missing
    pub is_compatible: bool,
    /// Expected names that were not produced, in expected order
    pub missing: Vec<String>,
    /// Produced names the model does not use, in produced order
    pub extra: Vec<String>,
    /// Human readable notes
    pub warnings: Vec<String>,
}

fn preview(names: &[String]) -> String {
    let shown: Vec<&str> = names.iter().take(10).map(String::as_str).collect();
    format!("{:?}", shown)
}

/// Compare expected feature names with the names a feature build produced.
///
/// Extra names never block compatibility. When `produced_frame` is given and
/// the names are compatible, expected names absent from the frame's actual
/// columns add a warning.
pub fn reconcile<E, P>(
    expected: &[E],
    produced: &[P],
    produced_frame: Option<&FeatureFrame>,
) -> SchemaReport
where
    E: AsRef<str>,
    P: AsRef<str>,
{
    let expected_set: HashSet<&str> = expected.iter().map(AsRef::as_ref).collect();
    let produced_set: HashSet<&str> = produced.iter().map(AsRef::as_ref).collect();

    let mut seen = HashSet::new();
    let missing: Vec<String> = expected
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| !produced_set.contains(n) && seen.insert(*n))
        .map(str::to_string)
        .collect();

    let mut seen = HashSet::new();
    let extra: Vec<String> = produced
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| !expected_set.contains(n) && seen.insert(*n))
        .map(str::to_string)
        .collect();

    let is_compatible = missing.is_empty();
    let mut warnings = Vec::new();

    if !missing.is_empty() {
        warnings.push(format!("Columns missing from the data: {}", preview(&missing)));
    }
    if !extra.is_empty() {
        warnings.push(format!("Extra columns in the data (unused): {}", preview(&extra)));
    }

    if let (Some(frame), true) = (produced_frame, is_compatible) {
        let absent = expected
            .iter()
            .filter(|n| !frame.has_column(n.as_ref()))
            .count();
        if absent > 0 {
            warnings.push(format!(
                "{} expected columns are not available in the feature frame",
                absent
            ));
        }
    }

    SchemaReport {
        is_compatible,
        missing,
        extra,
        warnings,
    }
}

/// Default for an expected feature the live data did not produce
fn default_feature_value(
    name: &str,
    features: &FeatureFrame,
    target: Option<&str>,
    last_timestamp: Option<DateTime<Utc>>,
) -> f64 {
    let lower = name.to_lowercase();

    if lower.contains("lag") || lower.contains("diff") {
        0.0
    } else if lower.contains("ma") {
        target.and_then(|t| features.latest(t)).unwrap_or(0.0)
    } else if lower.contains("volatility") {
        0.0
    } else if lower.contains("day_of") || lower.contains("month") {
        match last_timestamp {
            Some(ts) if lower.contains("day_of_week") => {
                f64::from(ts.weekday().num_days_from_monday())
            }
            Some(ts) if lower.contains("day_of_month") => f64::from(ts.day()),
            Some(ts) if lower.contains("month") => f64::from(ts.month()),
            _ => 0.0,
        }
    } else {
        0.0
    }
}

/// Materialise a feature frame whose columns are exactly `expected`, in order.
///
/// A missing name is resolved from, in order: the latest value of the same
/// column in the working series, the latest target value when the name is
/// the target, then a default chosen from the name (`lag`/`diff` give 0,
/// `ma` gives the latest target, `volatility` gives 0, calendar names give
/// the last timestamp's component). Missing values resolve to a constant
/// column.
pub fn prepare_features_for_prediction(
    features: &FeatureFrame,
    expected: &[String],
    working: Option<&TimeSeriesFrame>,
    target: Option<&str>,
) -> FeatureFrame {
    let rows = features.len();
    let last_timestamp = working.and_then(TimeSeriesFrame::last_timestamp);

    let columns = expected
        .iter()
        .map(|name| {
            if let Some(values) = features.column(name) {
                return (name.clone(), values.to_vec());
            }

            let fill = match working {
                Some(frame) if frame.has_column(name) => frame.last_value(name).unwrap_or(0.0),
                Some(frame) if target == Some(name.as_str()) => {
                    frame.last_value(name).unwrap_or(0.0)
                }
                _ => default_feature_value(name, features, target, last_timestamp),
            };

            (name.clone(), vec![Some(fill); rows])
        })
        .collect();

    // Every column has `rows` values, so construction cannot fail
    FeatureFrame::from_columns(columns).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_dedupes_and_keeps_order() {
        let report = reconcile(&["c", "a", "c", "b"], &["a", "z", "z"], None);
        assert!(!report.is_compatible);
        assert_eq!(report.missing, vec!["c", "b"]);
        assert_eq!(report.extra, vec!["z"]);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_frame_double_check_warns() {
        let frame = FeatureFrame::from_columns(vec![("a".to_string(), vec![Some(1.0)])]).unwrap();
        let report = reconcile(&["a", "b"], &["a", "b"], Some(&frame));
        assert!(report.is_compatible);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_ma_default_uses_latest_target() {
        let features = FeatureFrame::from_columns(vec![(
            "Close".to_string(),
            vec![Some(10.0), Some(12.0)],
        )])
        .unwrap();
        let expected = vec!["ma_price_99".to_string(), "lag_x".to_string()];

        let out = prepare_features_for_prediction(&features, &expected, None, Some("Close"));

        assert_eq!(out.names(), expected.as_slice());
        assert_eq!(out.column("ma_price_99").unwrap(), &[Some(12.0); 2]);
        assert_eq!(out.column("lag_x").unwrap(), &[Some(0.0); 2]);
    }
}
