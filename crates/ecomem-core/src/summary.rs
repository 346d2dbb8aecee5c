//! Aggregated estimator outputs
//!
//! Durable results of one memory-estimation call: the long-format
//! (variable, lag) importance table, the per-repetition pseudo-R² values, and
//! the prediction summary. Everything here is immutable once produced and
//! serializable for downstream plotting or columnar storage.

use serde::{Deserialize, Serialize};

/// Percentile summary of one (variable, lag) pair across repetitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRow {
    pub variable: String,
    pub lag: f64,
    pub median: f64,
    pub sd: f64,
    pub p05: f64,
    pub p95: f64,
}

/// Per-row-position summary of model predictions across repetitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub median: Vec<f64>,
    pub sd: Vec<f64>,
    pub p05: Vec<f64>,
    pub p95: Vec<f64>,
}

/// Aggregation of every repetition of the memory estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    /// Response variable the model predicted.
    pub response: String,
    /// Driver variables, in the order they were supplied.
    pub drivers: Vec<String>,
    /// Long-format importance table, one row per (variable, lag).
    pub memory: Vec<MemoryRow>,
    /// Squared Pearson correlation of predictions vs observations, one value
    /// per repetition.
    pub r2: Vec<f64>,
    /// Prediction percentiles per modeling-row position.
    pub predictions: PredictionSummary,
}

impl MemorySummary {
    /// All rows belonging to one variable, in lag order.
    pub fn rows_for(&self, variable: &str) -> impl Iterator<Item = &MemoryRow> + '_ {
        let variable = variable.to_string();
        self.memory.iter().filter(move |r| r.variable == variable)
    }

    /// Median importance of one (variable, lag) pair, if present.
    pub fn median_at(&self, variable: &str, lag: f64) -> Option<f64> {
        self.memory
            .iter()
            .find(|r| r.variable == variable && r.lag == lag)
            .map(|r| r.median)
    }

    /// Distinct lag values present in the table, ascending.
    pub fn lags(&self) -> Vec<f64> {
        let mut lags: Vec<f64> = Vec::new();
        for row in &self.memory {
            if !lags.contains(&row.lag) {
                lags.push(row.lag);
            }
        }
        lags.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        lags
    }
}
