//! Memory feature extraction
//!
//! Collapses one aggregated memory table into three scalar families per
//! memory component:
//! - **strength** — peak median importance above the random baseline
//! - **length** — fraction of non-concurrent lags scoring above the baseline
//! - **dominance** — fraction of non-concurrent lags where one component
//!   outranks the other once both are thresholded by the baseline
//!
//! Ties — values exactly at the baseline, or endogenous and exogenous scoring
//! exactly equal — count toward neither side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::benchmark::BENCHMARK_VARIABLE;
use crate::summary::MemorySummary;

/// Errors raised while deriving memory features.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("variable '{name}' is not present in the memory summary")]
    UnknownVariable { name: String },
    #[error("no exogenous variables supplied")]
    NoExogenous,
    #[error("memory summary has no lags beyond lag 0; at least one non-concurrent lag is required")]
    NoNonConcurrentLags,
}

/// Scalar memory features for one analyzed unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFeatures {
    /// Identity of the analyzed unit (taxon, response variable).
    pub label: String,
    pub strength_endogenous: f64,
    pub strength_exogenous: f64,
    pub strength_concurrent: f64,
    pub length_endogenous: f64,
    pub length_exogenous: f64,
    pub dominance_endogenous: f64,
    pub dominance_exogenous: f64,
}

/// Derive the eight-field feature record from one memory summary.
///
/// `endogenous` is the response variable; `exogenous` lists the driver
/// variables, first one carrying the concurrent-effect measurement. With
/// several exogenous variables the per-lag exogenous score is the maximum
/// median importance across them.
pub fn extract_memory_features(
    summary: &MemorySummary,
    label: &str,
    endogenous: &str,
    exogenous: &[&str],
) -> Result<MemoryFeatures, FeatureError> {
    if exogenous.is_empty() {
        return Err(FeatureError::NoExogenous);
    }
    for name in std::iter::once(&endogenous).chain(exogenous.iter()) {
        if summary.rows_for(name).next().is_none() {
            return Err(FeatureError::UnknownVariable {
                name: name.to_string(),
            });
        }
    }

    // Baseline: the benchmark's median importance at lag 0, floored at 0.
    // Absence of a benchmark is not an error; the floor stands in for it.
    let baseline = summary
        .median_at(BENCHMARK_VARIABLE, 0.0)
        .unwrap_or(0.0)
        .max(0.0);

    let concurrent = summary
        .median_at(exogenous[0], 0.0)
        .ok_or_else(|| FeatureError::UnknownVariable {
            name: exogenous[0].to_string(),
        })?;
    let strength_concurrent = concurrent - baseline;

    // The concurrent effect is measured; all further features live on the
    // non-concurrent lags.
    let lags: Vec<f64> = summary.lags().into_iter().filter(|&l| l > 0.0).collect();
    if lags.is_empty() {
        return Err(FeatureError::NoNonConcurrentLags);
    }
    let n_lags = lags.len() as f64;

    let endo_at = |lag: f64| summary.median_at(endogenous, lag).unwrap_or(f64::NAN);
    let exo_at = |lag: f64| {
        exogenous
            .iter()
            .filter_map(|name| summary.median_at(name, lag))
            .fold(f64::NAN, f64::max)
    };

    let strength_endogenous = lags
        .iter()
        .map(|&l| endo_at(l))
        .fold(f64::NEG_INFINITY, f64::max)
        - baseline;
    let strength_exogenous = lags
        .iter()
        .map(|&l| exo_at(l))
        .fold(f64::NEG_INFINITY, f64::max)
        - baseline;

    let length_endogenous =
        lags.iter().filter(|&&l| endo_at(l) > baseline).count() as f64 / n_lags;
    let length_exogenous =
        lags.iter().filter(|&&l| exo_at(l) > baseline).count() as f64 / n_lags;

    // Dominance: threshold each component by the baseline, then count the
    // lags where one strictly outranks the other.
    let mut endo_wins = 0usize;
    let mut exo_wins = 0usize;
    for &lag in &lags {
        let e = endo_at(lag);
        let x = exo_at(lag);
        let e = if e > baseline { e } else { 0.0 };
        let x = if x > baseline { x } else { 0.0 };
        if e > x {
            endo_wins += 1;
        } else if x > e {
            exo_wins += 1;
        }
    }

    Ok(MemoryFeatures {
        label: label.to_string(),
        strength_endogenous,
        strength_exogenous,
        strength_concurrent,
        length_endogenous,
        length_exogenous,
        dominance_endogenous: endo_wins as f64 / n_lags,
        dominance_exogenous: exo_wins as f64 / n_lags,
    })
}
