//! Error types for the stepcast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the stepcast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Malformed model artifact (missing keys, no predictor, bad feature list)
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// The first forecasting step could not produce a value
    #[error("Forecasting error: {0}")]
    ForecastingError(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// A predictor failed to produce an output
    #[error("Prediction error: {0}")]
    PredictionError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown job or job store failure
    #[error("Job error: {0}")]
    JobError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON encoding or decoding
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from series calculations
    #[error("Math error: {0}")]
    MathError(#[from] series_math::MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::DataError(err.to_string())
    }
}
