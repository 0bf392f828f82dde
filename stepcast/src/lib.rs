//! # Stepcast
//!
//! Iterative point forecasts with confidence bands from a pre-trained
//! difference model.
//!
//! ## Features
//!
//! - Time series frames loaded from CSV or polars DataFrames
//! - Lag, rolling, calendar and volatility features
//! - Model artifact validation and feature schema reconciliation
//! - A step-by-step forecast loop with a fallback path for failing steps
//! - Summary metrics, JSON job records and background jobs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepcast::{DataLoader, ForecastConfig, ForecastEngine, EngineSettings};
//! use stepcast::artifact::{validate_artifact, ArtifactValue};
//!
//! # fn main() -> stepcast::Result<()> {
//! let frame = DataLoader::from_csv("prices.csv")?;
//!
//! let manifest = std::fs::read_to_string("model.json")?;
//! let artifact = validate_artifact(&ArtifactValue::from_manifest_str(&manifest)?)?;
//!
//! let engine = ForecastEngine::new(EngineSettings::default());
//! let forecast = engine.run(&artifact, &frame, "Close", &ForecastConfig::default())?;
//!
//! for row in forecast.rows() {
//!     println!("{} {:.4} [{:.4}, {:.4}]", row.date, row.forecast_value, row.lower_bound, row.upper_bound);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod features;
pub mod jobs;
pub mod metrics;
pub mod schema;
pub mod service;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use crate::artifact::{validate_artifact, ArtifactValue, ModelArtifact, Predictor};
pub use crate::config::{ConfidenceLevel, EngineSettings, ForecastConfig, ForecastInterval};
pub use crate::data::{DataLoader, TimeSeriesFrame};
pub use crate::engine::{Forecast, ForecastEngine, ForecastOutput, ForecastStep, StepProvenance};
pub use crate::error::{ForecastError, Result};
pub use crate::features::FeatureBuilder;
pub use crate::metrics::ForecastMetrics;
pub use crate::schema::{reconcile, SchemaReport};
pub use crate::service::{ForecastRequest, ForecastService};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
