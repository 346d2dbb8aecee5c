//! # ecomem-core
//!
//! Ecological-memory quantification for regular environmental time series:
//! how much a biotic response depends on its own past (endogenous memory),
//! on past driver values (exogenous memory), and on present driver values
//! (concurrent effect).
//!
//! The pipeline:
//! 1. [`lag::LagTransformer`] turns a regular multivariate series into a wide
//!    table of time-shifted copies ([`table::LaggedTable`]).
//! 2. [`estimator::MemoryEstimator`] repeatedly fits a pluggable
//!    regression-importance oracle ([`oracle::ImportanceOracle`]) against the
//!    lagged table, regenerating a random benchmark column
//!    ([`benchmark::BenchmarkMode`]) on every repetition, and aggregates the
//!    importance distributions into a [`summary::MemorySummary`].
//! 3. [`features::extract_memory_features`] collapses a summary into the
//!    strength / length / dominance scalars per memory component.
//!
//! ## Example
//!
//! ```ignore
//! use ecomem_core::{LagTransformer, MemoryEstimator, extract_memory_features};
//!
//! let lagged = LagTransformer::new(vec![0.0, 10.0, 20.0, 30.0])
//!     .transform(&series, "pollen", &["temperature"])?;
//! let summary = MemoryEstimator::new().estimate(&lagged, &oracle)?;
//! let features = extract_memory_features(&summary, "pollen", "pollen", &["temperature"])?;
//! ```
//!
//! The supervised learning engine is deliberately external: anything able to
//! fit a regression and report permutation importance plugs in through
//! [`oracle::ImportanceOracle`] (see the `ecomem-forest` crate for the
//! reference backend).

pub mod benchmark;
pub mod config;
pub mod estimator;
pub mod features;
pub mod lag;
pub mod oracle;
pub mod stats;
pub mod summary;
pub mod table;

pub use benchmark::{generate_benchmark, BenchmarkMode, BENCHMARK_VARIABLE};
pub use config::{ConfigError, EcomemConfig};
pub use estimator::{EstimatorConfig, EstimatorError, MemoryEstimator, TrendSubset};
pub use features::{extract_memory_features, FeatureError, MemoryFeatures};
pub use lag::{LagConfig, LagError, LagTransformer};
pub use oracle::{ColumnId, ImportanceOracle, OracleError, OracleOutput, OracleRequest};
pub use summary::{MemoryRow, MemorySummary, PredictionSummary};
pub use table::{LaggedColumn, LaggedTable, TableError, TimeSeriesTable};

#[cfg(test)]
mod tests_proptest;
