//! Fill policies for missing observations
//!
//! The policies mirror the usual dataframe semantics:
//! - backward fill: a gap takes the next defined value
//! - forward fill: a gap takes the previous defined value
//! - constant fill: a gap takes a fixed value

use crate::present;
use serde::{Deserialize, Serialize};

/// A single fill step, applied in the order given to [`apply_fill_chain`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Fill from the next defined value
    Backward,
    /// Fill from the previous defined value
    Forward,
    /// Fill with a constant
    Constant(f64),
}

/// Backward fill
pub fn backfill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out: Vec<Option<f64>> = values.iter().map(|v| present(*v)).collect();
    let mut next: Option<f64> = None;

    for slot in out.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }

    out
}

/// Forward fill
pub fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out: Vec<Option<f64>> = values.iter().map(|v| present(*v)).collect();
    let mut previous: Option<f64> = None;

    for slot in out.iter_mut() {
        match slot {
            Some(v) => previous = Some(*v),
            None => *slot = previous,
        }
    }

    out
}

/// Constant fill
pub fn fill_constant(values: &[Option<f64>], constant: f64) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| Some(present(*v).unwrap_or(constant)))
        .collect()
}

/// Apply each policy in turn
pub fn apply_fill_chain(values: &[Option<f64>], chain: &[FillPolicy]) -> Vec<Option<f64>> {
    chain
        .iter()
        .fold(values.to_vec(), |acc, policy| match policy {
            FillPolicy::Backward => backfill(&acc),
            FillPolicy::Forward => forward_fill(&acc),
            FillPolicy::Constant(c) => fill_constant(&acc, *c),
        })
}
