//! Memory Estimator
//!
//! Repeatedly fits the regression-importance oracle on the lagged table,
//! regenerating the random benchmark column on every repetition, and
//! aggregates the per-feature importance distributions into the long-format
//! memory table. Each repetition is an independent pure function of its seed,
//! run as a rayon fork-join with a barrier before aggregation.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::benchmark::{generate_benchmark, BenchmarkMode, BENCHMARK_VARIABLE};
use crate::oracle::{ColumnId, ImportanceOracle, OracleError, OracleRequest};
use crate::stats;
use crate::summary::{MemoryRow, MemorySummary, PredictionSummary};
use crate::table::LaggedTable;

/// Reserved separator in rendered column labels. Variable names containing it
/// would collide with the `<variable>__<lag>` convention.
pub const RESERVED_SEPARATOR: &str = "__";

/// Which response-trend rows to keep for model fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSubset {
    /// Rows whose transition to the next sample increases the response.
    Up,
    /// Rows whose transition to the next sample decreases the response.
    Down,
    /// Every row.
    All,
}

/// Memory-estimation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of independent model fits to aggregate.
    pub repetitions: usize,
    /// Null-model benchmark column regenerated on every repetition.
    pub benchmark: BenchmarkMode,
    /// Optional restriction to rows on an upward or downward response trend.
    pub subset: TrendSubset,
    /// Minimum observations per leaf, forwarded to the oracle.
    pub min_leaf: usize,
    /// Ensemble size, forwarded to the oracle.
    pub trees: usize,
    /// Oracle worker threads; 0 leaves the choice to the backend.
    pub threads: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            repetitions: 10,
            benchmark: BenchmarkMode::Autocorrelated,
            subset: TrendSubset::All,
            min_leaf: 5,
            trees: 500,
            threads: 0,
        }
    }
}

/// Errors raised by [`MemoryEstimator::estimate`]. Every one of them aborts
/// the call; there is no partial result.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("repetitions must be at least 1")]
    NoRepetitions,
    #[error("variable name '{name}' contains the reserved separator \"__\"")]
    ReservedSeparator { name: String },
    #[error("variable name '{name}' is reserved for the benchmark column while a benchmark mode is active")]
    ReservedVariable { name: String },
    #[error("lagged table is missing the lag-0 response column '{response}'")]
    MissingTarget { response: String },
    #[error("no usable rows remain after {subset:?} trend subsetting and NaN removal")]
    EmptySubset { subset: TrendSubset },
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// One repetition's artifacts, collected before aggregation.
struct MemorySample {
    importance: Vec<f64>,
    predictions: Vec<f64>,
    r2: f64,
}

/// Derives variable-importance distributions and a calibrated random
/// benchmark from a lagged table.
pub struct MemoryEstimator {
    config: EstimatorConfig,
}

impl Default for MemoryEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEstimator {
    pub fn new() -> Self {
        Self::with_config(EstimatorConfig::default())
    }

    pub fn with_config(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Run the repeated-fitting procedure against `oracle` and aggregate the
    /// repetitions into a [`MemorySummary`].
    pub fn estimate<O>(
        &self,
        lagged: &LaggedTable,
        oracle: &O,
    ) -> Result<MemorySummary, EstimatorError>
    where
        O: ImportanceOracle + ?Sized,
    {
        if self.config.repetitions == 0 {
            return Err(EstimatorError::NoRepetitions);
        }
        self.validate_names(lagged)?;

        let target_column = lagged
            .column(lagged.response(), 0.0)
            .ok_or_else(|| EstimatorError::MissingTarget {
                response: lagged.response().to_string(),
            })?;

        // Retain the feature columns: every (variable, lag) pair belonging to
        // the response or a listed driver, minus the lag-0 response (target).
        // The time column never enters the model.
        let features: Vec<&crate::table::LaggedColumn> = lagged
            .columns()
            .iter()
            .filter(|c| {
                let owned = c.variable == lagged.response()
                    || lagged.drivers().iter().any(|d| *d == c.variable);
                owned && !(c.variable == lagged.response() && c.lag == 0.0)
            })
            .collect();

        let rows = self.select_rows(target_column, &features, lagged.n_rows());
        if rows.len() < 2 {
            return Err(EstimatorError::EmptySubset {
                subset: self.config.subset,
            });
        }

        let target: Vec<f64> = rows.iter().map(|&i| target_column.values[i]).collect();
        let mut names: Vec<ColumnId> = features
            .iter()
            .map(|c| ColumnId::new(c.variable.clone(), c.lag))
            .collect();
        let with_benchmark = self.config.benchmark.is_active();
        if with_benchmark {
            names.push(ColumnId::new(BENCHMARK_VARIABLE, 0.0));
        }

        // Base feature matrix, row-subset applied; the benchmark column is
        // appended per repetition.
        let base_width = features.len();
        let width = base_width + usize::from(with_benchmark);
        let mut base = Array2::<f64>::zeros((rows.len(), width));
        for (j, column) in features.iter().enumerate() {
            for (out_i, &i) in rows.iter().enumerate() {
                base[[out_i, j]] = column.values[i];
            }
        }
        let y = Array1::from(target.clone());

        log::info!(
            "estimating memory of '{}': {} repetitions over {} rows x {} features (benchmark {:?})",
            lagged.response(),
            self.config.repetitions,
            rows.len(),
            width,
            self.config.benchmark
        );

        // Fork-join over repetitions: each one is a pure function of its
        // seed. The collect() is the barrier before aggregation.
        let samples: Vec<MemorySample> = (0..self.config.repetitions)
            .into_par_iter()
            .map(|rep| self.run_repetition(rep as u64, &base, base_width, &names, &y, oracle))
            .collect::<Result<_, EstimatorError>>()?;

        Ok(self.aggregate(lagged, &names, samples))
    }

    fn validate_names(&self, lagged: &LaggedTable) -> Result<(), EstimatorError> {
        for name in std::iter::once(lagged.response())
            .chain(lagged.drivers().iter().map(|d| d.as_str()))
        {
            if name.contains(RESERVED_SEPARATOR) {
                return Err(EstimatorError::ReservedSeparator {
                    name: name.to_string(),
                });
            }
            if self.config.benchmark.is_active() && name == BENCHMARK_VARIABLE {
                return Err(EstimatorError::ReservedVariable {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Label each row by the response trend leaving it and select the rows
    /// matching the configured subset, dropping rows with any NaN. The final
    /// row has no outgoing transition and is excluded from Up/Down subsets.
    fn select_rows(
        &self,
        target: &crate::table::LaggedColumn,
        features: &[&crate::table::LaggedColumn],
        n_rows: usize,
    ) -> Vec<usize> {
        let complete = |i: usize| {
            target.values[i].is_finite() && features.iter().all(|c| c.values[i].is_finite())
        };
        match self.config.subset {
            TrendSubset::All => (0..n_rows).filter(|&i| complete(i)).collect(),
            TrendSubset::Up => (0..n_rows.saturating_sub(1))
                .filter(|&i| target.values[i + 1] > target.values[i] && complete(i))
                .collect(),
            TrendSubset::Down => (0..n_rows.saturating_sub(1))
                .filter(|&i| target.values[i + 1] < target.values[i] && complete(i))
                .collect(),
        }
    }

    fn run_repetition<O>(
        &self,
        seed: u64,
        base: &Array2<f64>,
        base_width: usize,
        names: &[ColumnId],
        y: &Array1<f64>,
        oracle: &O,
    ) -> Result<MemorySample, EstimatorError>
    where
        O: ImportanceOracle + ?Sized,
    {
        let n = base.nrows();
        let mut x = base.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        if let Some(benchmark) = generate_benchmark(n, self.config.benchmark, &mut rng) {
            for (i, v) in benchmark.into_iter().enumerate() {
                x[[i, base_width]] = v;
            }
        }

        let request = OracleRequest {
            x: x.view(),
            names,
            y: y.view(),
            min_leaf: self.config.min_leaf,
            trees: self.config.trees,
            threads: self.config.threads,
            seed,
        };
        let output = oracle.fit_importance(&request)?;
        output.validate(&request)?;

        let r = stats::pearson(&output.predictions, y.as_slice().unwrap_or(&[]));
        let r2 = if r.is_finite() { r * r } else { 0.0 };
        log::debug!("repetition {seed}: pseudo-R2 {r2:.4}");

        Ok(MemorySample {
            importance: output.importance,
            predictions: output.predictions,
            r2,
        })
    }

    /// Stack the repetitions and summarize each (variable, lag) pair. The
    /// benchmark is fit once per repetition but reported once per distinct
    /// lag so it offers a comparison point at every lag.
    fn aggregate(
        &self,
        lagged: &LaggedTable,
        names: &[ColumnId],
        samples: Vec<MemorySample>,
    ) -> MemorySummary {
        let reps = samples.len();
        let mut rows: Vec<MemoryRow> = Vec::with_capacity(names.len());
        let mut scores = Vec::with_capacity(reps);
        for (j, name) in names.iter().enumerate() {
            scores.clear();
            scores.extend(samples.iter().map(|s| s.importance[j]));
            rows.push(MemoryRow {
                variable: name.variable.clone(),
                lag: name.lag,
                median: stats::median(&scores),
                sd: stats::sample_sd(&scores),
                p05: stats::quantile(&scores, 0.05),
                p95: stats::quantile(&scores, 0.95),
            });
        }

        // Order the table as response, drivers in supplied order, benchmark.
        let mut memory: Vec<MemoryRow> = Vec::with_capacity(rows.len() + lagged.lags().len());
        let mut variables: Vec<&str> = vec![lagged.response()];
        variables.extend(lagged.drivers().iter().map(|d| d.as_str()));
        for variable in variables {
            let mut var_rows: Vec<MemoryRow> = rows
                .iter()
                .filter(|r| r.variable == variable)
                .cloned()
                .collect();
            var_rows.sort_by(|a, b| a.lag.partial_cmp(&b.lag).unwrap_or(std::cmp::Ordering::Equal));
            memory.extend(var_rows);
        }
        let bench = self
            .config
            .benchmark
            .is_active()
            .then(|| rows.iter().find(|r| r.variable == BENCHMARK_VARIABLE))
            .flatten();
        if let Some(bench) = bench {
            let mut bench = bench.clone();
            // A null predictor must never score below zero: floor the lower
            // percentile, and the median as well under white noise.
            bench.p05 = bench.p05.max(0.0);
            if self.config.benchmark == BenchmarkMode::WhiteNoise {
                bench.median = bench.median.max(0.0);
            }
            for &lag in lagged.lags() {
                memory.push(MemoryRow {
                    lag,
                    ..bench.clone()
                });
            }
        }

        let n = samples.first().map_or(0, |s| s.predictions.len());
        let mut predictions = PredictionSummary::default();
        let mut at_row = Vec::with_capacity(reps);
        for i in 0..n {
            at_row.clear();
            at_row.extend(samples.iter().map(|s| s.predictions[i]));
            predictions.median.push(stats::median(&at_row));
            predictions.sd.push(stats::sample_sd(&at_row));
            predictions.p05.push(stats::quantile(&at_row, 0.05));
            predictions.p95.push(stats::quantile(&at_row, 0.95));
        }

        MemorySummary {
            response: lagged.response().to_string(),
            drivers: lagged.drivers().to_vec(),
            memory,
            r2: samples.iter().map(|s| s.r2).collect(),
            predictions,
        }
    }
}
