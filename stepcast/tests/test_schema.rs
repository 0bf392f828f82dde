use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use stepcast::data::{Column, FrameIndex, TimeSeriesFrame};
use stepcast::features::FeatureFrame;
use stepcast::schema::{prepare_features_for_prediction, reconcile};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_missing_expected_name_is_incompatible() {
    let report = reconcile(&["a", "b", "c"], &["a", "b"], None);

    assert!(!report.is_compatible);
    assert_eq!(report.missing, strings(&["c"]));
    assert!(report.extra.is_empty());
}

#[test]
fn test_extra_name_is_still_compatible() {
    let report = reconcile(&["a"], &["a", "b"], None);

    assert!(report.is_compatible);
    assert!(report.missing.is_empty());
    assert_eq!(report.extra, strings(&["b"]));
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn test_unknown_missing_feature_defaults_to_zero() {
    let features =
        FeatureFrame::from_columns(vec![("Close_diff".to_string(), vec![Some(0.5), Some(0.25)])])
            .unwrap();
    let expected = strings(&["Close_diff", "missing_feat"]);

    let prepared = prepare_features_for_prediction(&features, &expected, None, Some("Close"));

    assert_eq!(prepared.names(), expected.as_slice());
    assert_eq!(prepared.column("Close_diff").unwrap(), &[Some(0.5), Some(0.25)]);
    assert_eq!(prepared.column("missing_feat").unwrap(), &[Some(0.0); 2]);
}

#[test]
fn test_missing_features_resolved_from_working_series_and_calendar() {
    // 2024-03-15 is a Friday
    let stamps = vec![
        Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap(),
    ];
    let working = TimeSeriesFrame::new(
        FrameIndex::Timestamps(stamps),
        vec![
            Column::from_values("Close", vec![10.0, 11.0]),
            Column::from_values("Volume", vec![500.0, 700.0]),
        ],
    )
    .unwrap();
    let features = FeatureFrame::from_columns(vec![(
        "Close".to_string(),
        vec![Some(10.0), Some(11.0)],
    )])
    .unwrap();
    let expected = strings(&[
        "Volume",
        "lag_diff_99",
        "ma_custom",
        "volatility",
        "day_of_week",
        "day_of_month",
        "month",
        "Close",
    ]);

    let prepared =
        prepare_features_for_prediction(&features, &expected, Some(&working), Some("Close"));

    let latest: Vec<f64> = expected
        .iter()
        .map(|n| prepared.latest(n).unwrap())
        .collect();
    assert_eq!(latest, vec![700.0, 0.0, 11.0, 0.0, 4.0, 15.0, 3.0, 11.0]);
}

#[test]
fn test_calendar_default_without_dates_is_zero() {
    let working =
        TimeSeriesFrame::without_index(vec![Column::from_values("Close", vec![1.0])]).unwrap();
    let features = FeatureFrame::from_columns(vec![("Close".to_string(), vec![Some(1.0)])])
        .unwrap();

    let prepared = prepare_features_for_prediction(
        &features,
        &strings(&["day_of_month"]),
        Some(&working),
        Some("Close"),
    );

    assert_eq!(prepared.latest("day_of_month"), Some(0.0));
}
