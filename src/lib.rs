//! # Stepcast workspace
//!
//! Umbrella crate re-exporting the workspace members:
//!
//! - [`series_math`]: differences, lags, rolling windows, fill policies and
//!   NaN-safe statistics
//! - [`stepcast`]: feature building, model artifacts, schema reconciliation,
//!   the iterative forecast engine and background jobs
//!
//! ```
//! use stepcast_workspace::series_math::sanitize;
//! use stepcast_workspace::stepcast::ConfidenceLevel;
//!
//! assert_eq!(sanitize(f64::NAN), 0.0);
//! assert_eq!(ConfidenceLevel::from_percent(99.0).z_score(), 2.576);
//! ```

pub use series_math;
pub use stepcast;
