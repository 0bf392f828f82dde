use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use stepcast::artifact::{ConstantPredictor, ModelArtifact, Predictor};
use stepcast::data::{Column, TimeSeriesFrame};
use stepcast::{
    ConfidenceLevel, EngineSettings, ForecastConfig, ForecastEngine, ForecastError,
    ForecastInterval, Result, StepProvenance,
};

fn linear_frame(len: usize) -> TimeSeriesFrame {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let dates = (0..len).map(|i| start + Duration::days(i as i64)).collect();
    let values = (0..len).map(|t| 100.0 + 0.5 * t as f64).collect();
    TimeSeriesFrame::from_series(dates, "Close", values).unwrap()
}

fn noisy_frame(len: usize, seed: u64) -> TimeSeriesFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let dates = (0..len).map(|i| start + Duration::days(i as i64)).collect();
    let mut price = 50.0;
    let values = (0..len)
        .map(|_| {
            price += rng.gen_range(-1.0..1.0);
            price
        })
        .collect();
    TimeSeriesFrame::from_series(dates, "Close", values).unwrap()
}

fn artifact<P: Predictor + 'static>(predictor: P) -> ModelArtifact {
    let names = stepcast::FeatureBuilder::new().feature_names("Close");
    ModelArtifact::new(predictor, names).unwrap()
}

fn config(horizon: usize, interval: ForecastInterval) -> ForecastConfig {
    ForecastConfig::new(horizon, interval, ConfidenceLevel::NinetyFive).unwrap()
}

fn engine() -> ForecastEngine {
    ForecastEngine::new(EngineSettings::default())
}

#[test]
fn test_constant_diff_extends_linear_trend() {
    let history = linear_frame(50);
    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 0.5 }),
            &history,
            "Close",
            &config(5, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.len(), 5);
    assert_eq!(forecast.base_value(), 124.5);
    assert_eq!(forecast.values(), vec![125.0, 125.5, 126.0, 126.5, 127.0]);
    assert_eq!(forecast.fallback_count(), 0);

    let rows = forecast.rows();
    let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(
        dates,
        vec!["2024-02-20", "2024-02-21", "2024-02-22", "2024-02-23", "2024-02-24"]
    );
    assert!(rows.iter().all(|r| r.variation == 0.5));
    assert_eq!(rows[0].period_index, 1);
}

#[test]
fn test_flat_differences_use_fraction_of_target_std() {
    let history = linear_frame(50);
    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 0.5 }),
            &history,
            "Close",
            &config(3, ForecastInterval::Day),
        )
        .unwrap();

    let observed: Vec<f64> = (0..50).map(|t| 100.0 + 0.5 * t as f64).collect();
    let expected_margin = 1.96 * series_math::sample_std(&observed) * 0.01;

    for step in forecast.steps() {
        assert_relative_eq!(step.upper_bound - step.value, expected_margin, epsilon = 1e-9);
        assert_relative_eq!(step.value - step.lower_bound, expected_margin, epsilon = 1e-9);
    }
}

#[test]
fn test_first_step_failure_fails_the_run() {
    let failing = |_: &[f64]| -> Result<f64> {
        Err(ForecastError::PredictionError("model exploded".to_string()))
    };

    let result = engine().run(
        &artifact(failing),
        &linear_frame(50),
        "Close",
        &config(5, ForecastInterval::Day),
    );

    match result {
        Err(ForecastError::ForecastingError(message)) => {
            assert!(message.contains("model exploded"))
        }
        other => panic!("expected a forecasting error, got {:?}", other),
    }
}

#[test]
fn test_first_step_panic_fails_the_run() {
    let panicking = |_: &[f64]| -> Result<f64> { panic!("bad weights") };

    let result = engine().run(
        &artifact(panicking),
        &linear_frame(50),
        "Close",
        &config(2, ForecastInterval::Day),
    );

    assert!(matches!(result, Err(ForecastError::ForecastingError(_))));
}

#[test]
fn test_later_failures_repeat_previous_value() {
    let calls = AtomicUsize::new(0);
    let flaky = move |_: &[f64]| -> Result<f64> {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(0.0)
        } else {
            Err(ForecastError::PredictionError("unavailable".to_string()))
        }
    };

    let forecast = engine()
        .run(
            &artifact(flaky),
            &linear_frame(50),
            "Close",
            &config(5, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.len(), 5);
    assert_eq!(forecast.steps()[0].provenance, StepProvenance::Model);
    assert_eq!(forecast.steps()[0].value, 124.5);
    assert_eq!(forecast.fallback_count(), 4);

    for step in &forecast.steps()[1..] {
        assert_eq!(step.provenance, StepProvenance::Fallback);
        assert_eq!(step.value, 124.5);
        assert_relative_eq!(step.lower_bound, 0.95 * 124.5, epsilon = 1e-9);
        assert_relative_eq!(step.upper_bound, 1.05 * 124.5, epsilon = 1e-9);
        assert_eq!(step.diff_from_previous, 0.0);
    }

    // Fallback steps still advance one day each
    let dates = forecast.dates();
    for pair in dates.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::days(1));
    }
}

#[test]
fn test_non_finite_prediction_means_no_movement() {
    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: f64::NAN }),
            &linear_frame(50),
            "Close",
            &config(3, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.values(), vec![124.5; 3]);
    assert_eq!(forecast.fallback_count(), 0);
}

#[rstest]
#[case(1, ForecastInterval::Hour)]
#[case(5, ForecastInterval::Day)]
#[case(12, ForecastInterval::Week)]
#[case(30, ForecastInterval::Month)]
fn test_length_dates_and_band_ordering(#[case] horizon: usize, #[case] interval: ForecastInterval) {
    let history = noisy_frame(80, horizon as u64);
    let model = stepcast::artifact::LinearPredictor::new(vec![0.01; 17], 0.05);

    let forecast = engine()
        .run(&artifact(model), &history, "Close", &config(horizon, interval))
        .unwrap();

    assert_eq!(forecast.len(), horizon);
    assert_eq!(forecast.rows().len(), horizon);

    let mut previous = history.last_timestamp().unwrap();
    for step in forecast.steps() {
        assert_eq!(step.date, interval.advance(previous));
        assert!(step.lower_bound <= step.value && step.value <= step.upper_bound);
        previous = step.date;
    }
}

#[test]
fn test_month_steps_follow_calendar() {
    let dates = vec![
        Utc.with_ymd_and_hms(2023, 11, 30, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap(),
    ];
    let history = TimeSeriesFrame::from_series(dates, "Close", vec![10.0, 11.0]).unwrap();

    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 1.0 }),
            &history,
            "Close",
            &config(3, ForecastInterval::Month),
        )
        .unwrap();

    let dates: Vec<String> = forecast.rows().into_iter().map(|r| r.date).collect();
    assert_eq!(dates, vec!["2024-01-31", "2024-02-29", "2024-03-29"]);
}

#[test]
fn test_historical_frame_is_not_mutated() {
    let history = linear_frame(30);
    let before = history.clone();

    engine()
        .run(
            &artifact(ConstantPredictor { value: 1.0 }),
            &history,
            "Close",
            &config(4, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(history, before);
}

#[test]
fn test_ordinal_history_gets_future_dates() {
    let history = TimeSeriesFrame::without_index(vec![
        Column::from_values("Close", vec![5.0, 6.0, 7.0, 8.0]),
        Column::text("Ticker", vec![Some("XYZ".to_string()); 4]),
    ])
    .unwrap();

    let before = Utc::now();
    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 1.0 }),
            &history,
            "Close",
            &config(3, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.values(), vec![9.0, 10.0, 11.0]);
    let dates = forecast.dates();
    assert!(dates[0] > before);
    assert!(dates.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_no_nan_or_inf_in_output() {
    let history = linear_frame(40);
    let engine = engine();
    let forecast = engine
        .run(
            &artifact(ConstantPredictor { value: f64::MAX }),
            &history,
            "Close",
            &config(4, ForecastInterval::Day),
        )
        .unwrap();

    for row in forecast.rows() {
        for value in [
            row.forecast_value,
            row.variation,
            row.lower_bound,
            row.upper_bound,
        ] {
            assert!(value.is_finite());
        }
    }

    let metrics = engine.summarize(&history, &forecast, "Close");
    for value in [
        metrics.historical_mean,
        metrics.historical_std,
        metrics.forecast_mean,
        metrics.forecast_range[0],
        metrics.forecast_range[1],
        metrics.confidence_range[0],
        metrics.confidence_range[1],
    ] {
        assert!(value.is_finite());
    }
}

#[test]
fn test_empty_history_and_bad_config() {
    let empty = TimeSeriesFrame::from_series(vec![], "Close", vec![]).unwrap();
    let model = artifact(ConstantPredictor { value: 1.0 });

    assert!(matches!(
        engine().run(&model, &empty, "Close", &config(3, ForecastInterval::Day)),
        Err(ForecastError::ForecastingError(_))
    ));

    let zero = ForecastConfig {
        horizon: 0,
        ..ForecastConfig::default()
    };
    assert!(matches!(
        engine().run(&model, &linear_frame(10), "Close", &zero),
        Err(ForecastError::InvalidParameter(_))
    ));
}

#[test]
fn test_single_row_history() {
    let history = linear_frame(1);
    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 2.0 }),
            &history,
            "Close",
            &config(3, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.values(), vec![102.0, 104.0, 106.0]);
    // No differences in history, so the first band uses the unit fallback
    let first = &forecast.steps()[0];
    assert_relative_eq!(first.upper_bound - first.value, 1.96, epsilon = 1e-9);
}

#[test]
fn test_trailing_missing_target_anchors_at_last_value() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let dates: Vec<_> = (0..50).map(|i| start + Duration::days(i)).collect();
    let mut values: Vec<Option<f64>> = (0..50).map(|t| Some(100.0 + 0.5 * t as f64)).collect();
    values[48] = Some(f64::NAN);
    values[49] = None;
    let history = TimeSeriesFrame::new(
        stepcast::data::FrameIndex::Timestamps(dates),
        vec![Column::numeric("Close", values)],
    )
    .unwrap();

    let forecast = engine()
        .run(
            &artifact(ConstantPredictor { value: 0.5 }),
            &history,
            "Close",
            &config(3, ForecastInterval::Day),
        )
        .unwrap();

    assert_eq!(forecast.base_value(), 123.5);
    assert_eq!(forecast.values(), vec![124.0, 124.5, 125.0]);
    let dates: Vec<String> = forecast.rows().into_iter().map(|r| r.date).collect();
    assert_eq!(dates, vec!["2024-02-18", "2024-02-19", "2024-02-20"]);
}

#[test]
fn test_target_without_values_fails() {
    let history = TimeSeriesFrame::without_index(vec![Column::numeric("Close", vec![None, None])])
        .unwrap();

    assert!(matches!(
        engine().run(
            &artifact(ConstantPredictor { value: 1.0 }),
            &history,
            "Close",
            &config(2, ForecastInterval::Day),
        ),
        Err(ForecastError::ForecastingError(_))
    ));
}
