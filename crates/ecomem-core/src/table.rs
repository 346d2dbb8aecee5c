//! Time-series tables
//!
//! Column-oriented containers for the pipeline:
//! - [`TimeSeriesTable`] — a validated regular multivariate series (input)
//! - [`LaggedTable`] — the wide table of time-shifted copies produced by the
//!   lag transformer, carrying the response/driver names and one tagged
//!   `(variable, lag)` pair per column so downstream code never recovers the
//!   pair by parsing column labels.
//!
//! Missing values are `f64::NAN`.

use thiserror::Error;

/// Relative tolerance on the spread of successive time differences when
/// checking that the index forms a regular grid.
const REGULARITY_TOL: f64 = 1e-6;

/// Errors raised while constructing or querying a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table needs at least 2 rows, got {rows}")]
    TooFewRows { rows: usize },
    #[error("column '{name}' has {len} values but the time index has {expected}")]
    LengthMismatch {
        name: String,
        len: usize,
        expected: usize,
    },
    #[error("duplicate column name '{name}'")]
    DuplicateColumn { name: String },
    #[error("time index must be strictly increasing (violated at row {row})")]
    NonMonotonicTime { row: usize },
    #[error("time index is not regularly spaced (spread of successive steps {spread:.3e} exceeds tolerance)")]
    IrregularTime { spread: f64 },
    #[error("column '{name}' not found")]
    UnknownColumn { name: String },
}

/// A regular multivariate time series: one strictly increasing, constant-step
/// time index plus named numeric columns of equal length.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    time_name: String,
    time: Vec<f64>,
    names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    /// Build a table, validating the regular-grid invariant up front.
    pub fn new(
        time_name: impl Into<String>,
        time: Vec<f64>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, TableError> {
        let time_name = time_name.into();
        if time.len() < 2 {
            return Err(TableError::TooFewRows { rows: time.len() });
        }
        for (row, pair) in time.windows(2).enumerate() {
            if !(pair[1] > pair[0]) {
                return Err(TableError::NonMonotonicTime { row: row + 1 });
            }
        }
        let diffs: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
        let step = crate::stats::mean(&diffs);
        let spread = crate::stats::sample_sd(&diffs);
        if spread > REGULARITY_TOL * step.abs() {
            return Err(TableError::IrregularTime { spread });
        }

        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != time.len() {
                return Err(TableError::LengthMismatch {
                    name,
                    len: column.len(),
                    expected: time.len(),
                });
            }
            if name == time_name || names.contains(&name) {
                return Err(TableError::DuplicateColumn { name });
            }
            names.push(name);
            values.push(column);
        }

        Ok(Self {
            time_name,
            time,
            names,
            values,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.time.len()
    }

    pub fn time_name(&self) -> &str {
        &self.time_name
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Constant step of the time index.
    pub fn time_step(&self) -> f64 {
        self.time[1] - self.time[0]
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Result<&[f64], TableError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i].as_slice())
            .ok_or_else(|| TableError::UnknownColumn {
                name: name.to_string(),
            })
    }
}

/// One time-shifted column of a [`LaggedTable`]: the source variable, the lag
/// (in time units) at which it was shifted, and the aligned values.
#[derive(Debug, Clone)]
pub struct LaggedColumn {
    pub variable: String,
    pub lag: f64,
    pub values: Vec<f64>,
}

impl LaggedColumn {
    /// Display label in the `<variable>__<lag>` convention.
    pub fn label(&self) -> String {
        format!("{}__{}", self.variable, self.lag)
    }
}

/// Wide table of lagged copies, aligned row-wise and trimmed of the boundary
/// rows lost to shifting. Owns the response/driver names so downstream steps
/// need not be told again.
#[derive(Debug, Clone)]
pub struct LaggedTable {
    response: String,
    drivers: Vec<String>,
    lags: Vec<f64>,
    columns: Vec<LaggedColumn>,
    time_name: String,
    time: Vec<f64>,
}

impl LaggedTable {
    pub(crate) fn new(
        response: String,
        drivers: Vec<String>,
        lags: Vec<f64>,
        columns: Vec<LaggedColumn>,
        time_name: String,
        time: Vec<f64>,
    ) -> Self {
        Self {
            response,
            drivers,
            lags,
            columns,
            time_name,
            time,
        }
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn drivers(&self) -> &[String] {
        &self.drivers
    }

    /// The validated lag sequence (ascending, includes 0).
    pub fn lags(&self) -> &[f64] {
        &self.lags
    }

    pub fn columns(&self) -> &[LaggedColumn] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.time.len()
    }

    pub fn time_name(&self) -> &str {
        &self.time_name
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Look up a column by its tagged (variable, lag) pair.
    pub fn column(&self, variable: &str, lag: f64) -> Option<&LaggedColumn> {
        self.columns
            .iter()
            .find(|c| c.variable == variable && c.lag == lag)
    }
}
