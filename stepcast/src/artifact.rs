//! Model artifacts: a predictor plus the ordered feature schema it expects
//!
//! Artifacts arrive as loosely shaped values ([`ArtifactValue`]), usually
//! decoded from a JSON manifest, and are turned into a typed
//! [`ModelArtifact`] by [`validate_artifact`].

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A fitted model that maps one feature vector to a predicted difference
pub trait Predictor: Send + Sync {
    /// Predict from features ordered like the artifact's feature names
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "predictor"
    }
}

impl<F> Predictor for F
where
    F: Fn(&[f64]) -> Result<f64> + Send + Sync,
{
    fn predict(&self, features: &[f64]) -> Result<f64> {
        self(features)
    }
}

/// Linear model: `intercept + sum(weights[i] * features[i])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    /// One weight per feature
    pub weights: Vec<f64>,
    /// Constant term
    #[serde(default)]
    pub intercept: f64,
}

impl LinearPredictor {
    /// Create a linear model
    pub fn new(weights: Vec<f64>, intercept: f64) -> Self {
        Self { weights, intercept }
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(ForecastError::PredictionError(format!(
                "Expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }

        Ok(self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// Model that always predicts the same difference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantPredictor {
    /// Predicted difference
    pub value: f64,
}

impl Predictor for ConstantPredictor {
    fn predict(&self, _features: &[f64]) -> Result<f64> {
        Ok(self.value)
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Serialisable model description found under a manifest's `model` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Linear regression
    Linear(LinearPredictor),
    /// Constant difference
    Constant(ConstantPredictor),
}

impl ModelSpec {
    /// Instantiate the predictor
    pub fn into_predictor(self) -> Arc<dyn Predictor> {
        match self {
            ModelSpec::Linear(model) => Arc::new(model),
            ModelSpec::Constant(model) => Arc::new(model),
        }
    }
}

/// Dynamically shaped artifact content
#[derive(Clone)]
pub enum ArtifactValue {
    /// Absent value
    Null,
    /// Boolean flag
    Bool(bool),
    /// Any number
    Number(f64),
    /// Plain string
    Text(String),
    /// Mutable sequence; as a feature name only its first element counts
    List(Vec<ArtifactValue>),
    /// Compound name whose parts are joined with `_`
    Tuple(Vec<ArtifactValue>),
    /// Keyed entries, the top level of an artifact
    Map(BTreeMap<String, ArtifactValue>),
    /// Something that can predict
    Model(Arc<dyn Predictor>),
}

impl fmt::Debug for ArtifactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactValue::Null => f.write_str("Null"),
            ArtifactValue::Bool(b) => write!(f, "Bool({})", b),
            ArtifactValue::Number(n) => write!(f, "Number({})", n),
            ArtifactValue::Text(s) => write!(f, "Text({:?})", s),
            ArtifactValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ArtifactValue::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            ArtifactValue::Map(map) => f.debug_tuple("Map").field(map).finish(),
            ArtifactValue::Model(model) => write!(f, "Model({})", model.name()),
        }
    }
}

impl fmt::Display for ArtifactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactValue::Null => f.write_str("null"),
            ArtifactValue::Bool(b) => write!(f, "{}", b),
            ArtifactValue::Number(n) => write!(f, "{}", n),
            ArtifactValue::Text(s) => f.write_str(s),
            ArtifactValue::List(items) | ArtifactValue::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ArtifactValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            ArtifactValue::Model(model) => write!(f, "<model {}>", model.name()),
        }
    }
}

impl ArtifactValue {
    /// Map from `(key, value)` pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ArtifactValue)>) -> Self {
        ArtifactValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Text value
    pub fn text(s: impl Into<String>) -> Self {
        ArtifactValue::Text(s.into())
    }

    /// Predictor value
    pub fn model<P: Predictor + 'static>(predictor: P) -> Self {
        ArtifactValue::Model(Arc::new(predictor))
    }

    /// Short type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactValue::Null => "null",
            ArtifactValue::Bool(_) => "bool",
            ArtifactValue::Number(_) => "number",
            ArtifactValue::Text(_) => "text",
            ArtifactValue::List(_) => "list",
            ArtifactValue::Tuple(_) => "tuple",
            ArtifactValue::Map(_) => "map",
            ArtifactValue::Model(_) => "model",
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            ArtifactValue::Null => false,
            ArtifactValue::Bool(b) => *b,
            ArtifactValue::Number(n) => *n != 0.0,
            ArtifactValue::Text(s) => !s.is_empty(),
            ArtifactValue::List(v) | ArtifactValue::Tuple(v) => !v.is_empty(),
            ArtifactValue::Map(m) => !m.is_empty(),
            ArtifactValue::Model(_) => true,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            ArtifactValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Convert decoded JSON; arrays become tuples
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ArtifactValue::Null,
            Value::Bool(b) => ArtifactValue::Bool(b),
            Value::Number(n) => ArtifactValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => ArtifactValue::Text(s),
            Value::Array(items) => {
                ArtifactValue::Tuple(items.into_iter().map(Self::from_json).collect())
            }
            Value::Object(map) => ArtifactValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Decode a JSON manifest; a recognised `model` description becomes a predictor
    pub fn from_manifest_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        match value {
            serde_json::Value::Object(map) => Ok(ArtifactValue::Map(
                map.into_iter()
                    .map(|(key, value)| {
                        let converted = if key == "model" {
                            match serde_json::from_value::<ModelSpec>(value.clone()) {
                                Ok(spec) => ArtifactValue::Model(spec.into_predictor()),
                                Err(_) => Self::from_json(value),
                            }
                        } else {
                            Self::from_json(value)
                        };
                        (key, converted)
                    })
                    .collect(),
            )),
            other => Ok(Self::from_json(other)),
        }
    }
}

/// Normalise raw feature names to plain strings.
///
/// Tuples join their non-empty parts with `_` after trimming, lists keep
/// their first element, everything else is stringified. Order and
/// duplicates are preserved.
pub fn normalize_feature_names(raw: &[ArtifactValue]) -> Vec<String> {
    raw.iter()
        .map(|entry| match entry {
            ArtifactValue::Tuple(parts) => parts
                .iter()
                .filter(|p| p.is_truthy())
                .map(|p| p.to_string().trim().to_string())
                .collect::<Vec<_>>()
                .join("_")
                .trim()
                .to_string(),
            ArtifactValue::List(items) => match items.first() {
                Some(first) => first.to_string(),
                None => entry.to_string(),
            },
            other => other.to_string(),
        })
        .collect()
}

/// Optional descriptive fields of an artifact
#[derive(Debug, Clone, Default)]
pub struct ArtifactMetadata {
    /// Column the model was trained to forecast
    pub target_column: Option<String>,
    /// Free-form model family
    pub model_type: Option<String>,
    /// Model version
    pub version: Option<String>,
    /// Feature names before normalisation
    pub original_feature_columns: Vec<ArtifactValue>,
}

/// A validated model: predictor, expected feature names and metadata
#[derive(Clone)]
pub struct ModelArtifact {
    predictor: Arc<dyn Predictor>,
    feature_names: Vec<String>,
    metadata: ArtifactMetadata,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("predictor", &self.predictor.name())
            .field("feature_names", &self.feature_names)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ModelArtifact {
    /// Create an artifact from already typed parts
    pub fn new<P: Predictor + 'static>(predictor: P, feature_names: Vec<String>) -> Result<Self> {
        Self::from_shared(Arc::new(predictor), feature_names)
    }

    /// Create an artifact around a shared predictor
    pub fn from_shared(predictor: Arc<dyn Predictor>, feature_names: Vec<String>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(ForecastError::SchemaError(
                "feature_columns must not be empty".to_string(),
            ));
        }
        let original_feature_columns = feature_names
            .iter()
            .map(|n| ArtifactValue::Text(n.clone()))
            .collect();
        Ok(Self {
            predictor,
            feature_names,
            metadata: ArtifactMetadata {
                original_feature_columns,
                ..ArtifactMetadata::default()
            },
        })
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: ArtifactMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The predictor
    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    /// Expected feature names, in predictor order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Descriptive metadata
    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }
}

/// Validate a raw artifact
pub fn validate_artifact(raw: &ArtifactValue) -> Result<ModelArtifact> {
    validate_artifact_from(raw, None)
}

/// Validate a raw artifact, naming its source in error messages
pub fn validate_artifact_from(raw: &ArtifactValue, source: Option<&str>) -> Result<ModelArtifact> {
    let source = source.unwrap_or("unknown");

    let entries = match raw {
        ArtifactValue::Map(entries) => entries,
        other => {
            return Err(ForecastError::SchemaError(format!(
                "Model {} is a {}, expected a map with 'model' and 'feature_columns'",
                source,
                other.kind()
            )))
        }
    };

    let predictor = match entries.get("model") {
        None => {
            return Err(ForecastError::SchemaError(format!(
                "Model {} has no 'model' entry",
                source
            )))
        }
        Some(ArtifactValue::Model(predictor)) => Arc::clone(predictor),
        Some(other) => {
            return Err(ForecastError::SchemaError(format!(
                "Model {} has no predict capability (found {})",
                source,
                other.kind()
            )))
        }
    };

    let raw_features = match entries.get("feature_columns") {
        None => {
            return Err(ForecastError::SchemaError(format!(
                "Model {} has no 'feature_columns' entry",
                source
            )))
        }
        Some(ArtifactValue::List(items)) | Some(ArtifactValue::Tuple(items)) => items,
        Some(other) => {
            return Err(ForecastError::SchemaError(format!(
                "feature_columns of model {} must be a sequence, got {}",
                source,
                other.kind()
            )))
        }
    };

    if raw_features.is_empty() {
        return Err(ForecastError::SchemaError(format!(
            "Model {} has an empty feature_columns list",
            source
        )));
    }

    let metadata = ArtifactMetadata {
        target_column: entries.get("target_column").and_then(ArtifactValue::as_text),
        model_type: entries.get("model_type").and_then(ArtifactValue::as_text),
        version: entries.get("version").and_then(ArtifactValue::as_text),
        original_feature_columns: raw_features.clone(),
    };

    let feature_names = normalize_feature_names(raw_features);

    info!(
        "Loaded model {} ({}, {} features)",
        source,
        metadata.model_type.as_deref().unwrap_or(predictor.name()),
        feature_names.len()
    );

    Ok(ModelArtifact {
        predictor,
        feature_names,
        metadata,
    })
}
