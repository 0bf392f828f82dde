use pretty_assertions::assert_eq;
use rstest::rstest;
use stepcast::artifact::{
    normalize_feature_names, validate_artifact, ArtifactValue, LinearPredictor,
};
use stepcast::ForecastError;

fn names(items: &[&str]) -> ArtifactValue {
    ArtifactValue::Tuple(items.iter().map(|s| ArtifactValue::text(*s)).collect())
}

fn valid_artifact() -> ArtifactValue {
    ArtifactValue::map([
        ("model", ArtifactValue::model(LinearPredictor::new(vec![1.0, 2.0], 0.0))),
        (
            "feature_columns",
            ArtifactValue::List(vec![
                ArtifactValue::Tuple(vec![
                    ArtifactValue::text("High"),
                    ArtifactValue::text("BTC-USD"),
                ]),
                ArtifactValue::text("lag_diff_1"),
            ]),
        ),
        ("target_column", ArtifactValue::text("Close")),
        ("model_type", ArtifactValue::text("linear")),
        ("version", ArtifactValue::Number(2.0)),
    ])
}

#[test]
fn test_valid_artifact() {
    let artifact = validate_artifact(&valid_artifact()).unwrap();

    assert_eq!(artifact.feature_names(), &["High_BTC-USD", "lag_diff_1"]);
    assert_eq!(artifact.metadata().target_column.as_deref(), Some("Close"));
    assert_eq!(artifact.metadata().model_type.as_deref(), Some("linear"));
    assert_eq!(artifact.metadata().version.as_deref(), Some("2"));
    assert_eq!(artifact.metadata().original_feature_columns.len(), 2);
    assert_eq!(artifact.predictor().predict(&[1.0, 1.0]).unwrap(), 3.0);
}

#[test]
fn test_missing_feature_columns_is_schema_error() {
    let raw = ArtifactValue::map([(
        "model",
        ArtifactValue::model(LinearPredictor::new(vec![1.0], 0.0)),
    )]);

    assert!(matches!(
        validate_artifact(&raw),
        Err(ForecastError::SchemaError(_))
    ));
}

#[rstest]
#[case::not_a_map(ArtifactValue::text("model.pkl"))]
#[case::no_model(ArtifactValue::map([("feature_columns", names(&["a"]))]))]
#[case::model_cannot_predict(ArtifactValue::map([
    ("model", ArtifactValue::text("RandomForest")),
    ("feature_columns", names(&["a"])),
]))]
#[case::features_not_a_sequence(ArtifactValue::map([
    ("model", ArtifactValue::model(LinearPredictor::new(vec![1.0], 0.0))),
    ("feature_columns", ArtifactValue::text("a,b")),
]))]
#[case::empty_features(ArtifactValue::map([
    ("model", ArtifactValue::model(LinearPredictor::new(vec![1.0], 0.0))),
    ("feature_columns", names(&[])),
]))]
fn test_malformed_artifacts(#[case] raw: ArtifactValue) {
    assert!(matches!(
        validate_artifact(&raw),
        Err(ForecastError::SchemaError(_))
    ));
}

#[test]
fn test_feature_name_normalization() {
    let raw = vec![
        ArtifactValue::Tuple(vec![
            ArtifactValue::text(" Close "),
            ArtifactValue::text(""),
            ArtifactValue::text("AAPL"),
        ]),
        ArtifactValue::List(vec![ArtifactValue::text("first"), ArtifactValue::text("second")]),
        ArtifactValue::Number(7.0),
        ArtifactValue::text("lag_diff_1"),
        ArtifactValue::text("lag_diff_1"),
    ];

    assert_eq!(
        normalize_feature_names(&raw),
        vec!["Close_AAPL", "first", "7", "lag_diff_1", "lag_diff_1"]
    );
}

#[test]
fn test_manifest_nested_arrays_become_compound_names() {
    let raw = ArtifactValue::from_manifest_str(
        r#"{
            "model": {"kind": "linear", "weights": [0.1, 0.2], "intercept": 0.0},
            "feature_columns": [["Close", "diff"], "volatility"],
            "target_column": "Close"
        }"#,
    )
    .unwrap();

    let artifact = validate_artifact(&raw).unwrap();
    assert_eq!(artifact.feature_names(), &["Close_diff", "volatility"]);
    assert_eq!(artifact.predictor().name(), "linear");
}

#[test]
fn test_manifest_must_be_json() {
    assert!(matches!(
        ArtifactValue::from_manifest_str("not json"),
        Err(ForecastError::SerializationError(_))
    ));
}
