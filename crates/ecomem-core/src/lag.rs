//! Lag Transformer
//!
//! Converts a regular multivariate time series into a wide table of
//! time-shifted copies of the response and every driver, one copy per lag,
//! aligned row-wise with the boundary rows lost to shifting trimmed away.
//!
//! Lags are expressed in time units and converted to row offsets via
//! `round(lag / step)`. The `oldest_first` flag selects the shift direction:
//! with the oldest sample in row 0 the past of a row sits at lower indices,
//! with the most recent sample first (the palaeoecological convention, oldest
//! sample last) the past sits at higher indices. Reversing the row order and
//! flipping the flag yields the same lagged columns up to reindexing.

use thiserror::Error;

use crate::stats;
use crate::table::{LaggedColumn, LaggedTable, TableError, TimeSeriesTable};

/// Relative tolerance on the spread of successive lag differences when
/// checking that the lag sequence is arithmetic.
const LAG_REGULARITY_TOL: f64 = 1e-9;

/// Errors raised during lag construction, all before any shifting happens.
#[derive(Debug, Error)]
pub enum LagError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("no driver variables supplied")]
    NoDrivers,
    #[error("lag set is empty")]
    EmptyLags,
    #[error("lag {lag} is negative; lags must be non-negative time offsets")]
    NegativeLag { lag: f64 },
    #[error("lag sequence is not a regular arithmetic progression (spread of successive differences {spread:.3e})")]
    IrregularLags { spread: f64 },
    #[error("lags {lag_a} and {lag_b} both map to row offset {offset}; lags must align with the time resolution")]
    OffsetCollision { lag_a: f64, lag_b: f64, offset: usize },
    #[error("time window [{min}, {max}] lies outside the observed range [{observed_min}, {observed_max}]")]
    WindowOutOfRange {
        min: f64,
        max: f64,
        observed_min: f64,
        observed_max: f64,
    },
    #[error("time window [{min}, {max}] is empty or inverted")]
    EmptyWindow { min: f64, max: f64 },
    #[error("series has {rows} usable rows but the largest lag needs {required} more")]
    TooShort { rows: usize, required: usize },
}

/// Lag-construction options.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Lags in time-index units. Must form a regular arithmetic sequence;
    /// 0 is injected automatically when absent.
    pub lags: Vec<f64>,
    /// True when row 0 holds the oldest sample. False for the
    /// palaeoecological convention (most recent sample first).
    pub oldest_first: bool,
    /// Optional inclusive time window applied before shifting.
    pub time_window: Option<(f64, f64)>,
    /// Z-score every non-time column after trimming. Needed only when the
    /// lagged data feeds a linear model.
    pub scale: bool,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            lags: vec![0.0],
            oldest_first: false,
            time_window: None,
            scale: false,
        }
    }
}

/// Builds [`LaggedTable`]s from regular time series.
pub struct LagTransformer {
    config: LagConfig,
}

impl LagTransformer {
    /// Transformer with the given lag set and default options.
    pub fn new(lags: Vec<f64>) -> Self {
        Self::with_config(LagConfig {
            lags,
            ..LagConfig::default()
        })
    }

    pub fn with_config(config: LagConfig) -> Self {
        Self { config }
    }

    /// Lag `response` and every driver of `series` at each configured lag.
    pub fn transform(
        &self,
        series: &TimeSeriesTable,
        response: &str,
        drivers: &[&str],
    ) -> Result<LaggedTable, LagError> {
        if drivers.is_empty() {
            return Err(LagError::NoDrivers);
        }
        series.column(response)?;
        for driver in drivers {
            series.column(driver)?;
        }
        let lags = validate_lags(&self.config.lags)?;

        let rows = self.window_rows(series)?;
        let time: Vec<f64> = rows.iter().map(|&i| series.time()[i]).collect();
        let step = time[1] - time[0];

        // Map each lag onto a row offset, rejecting collisions up front.
        let mut offsets: Vec<usize> = Vec::with_capacity(lags.len());
        for (k, &lag) in lags.iter().enumerate() {
            let offset = (lag / step).round() as usize;
            if let Some(j) = offsets.iter().position(|&o| o == offset) {
                return Err(LagError::OffsetCollision {
                    lag_a: lags[j],
                    lag_b: lags[k],
                    offset,
                });
            }
            offsets.push(offset);
        }
        let max_offset = *offsets.iter().max().unwrap_or(&0);
        if max_offset + 2 > rows.len() {
            return Err(LagError::TooShort {
                rows: rows.len(),
                required: max_offset,
            });
        }

        let out_rows = rows.len() - max_offset;
        let mut variables: Vec<&str> = Vec::with_capacity(1 + drivers.len());
        variables.push(response);
        variables.extend(drivers.iter().copied());

        let mut columns: Vec<LaggedColumn> = Vec::with_capacity(variables.len() * lags.len());
        for variable in &variables {
            let source = series.column(variable)?;
            for (&lag, &offset) in lags.iter().zip(&offsets) {
                let values = self.shift(source, &rows, offset, out_rows);
                columns.push(LaggedColumn {
                    variable: variable.to_string(),
                    lag,
                    values,
                });
            }
        }

        // The unshifted time column keeps the rows that survived trimming.
        let trimmed_time: Vec<f64> = if self.config.oldest_first {
            time[max_offset..].to_vec()
        } else {
            time[..out_rows].to_vec()
        };

        let (columns, trimmed_time) = drop_nan_rows(columns, trimmed_time);
        let mut columns = columns;
        if self.config.scale {
            for column in &mut columns {
                stats::z_score_normalize(&mut column.values);
            }
        }

        log::debug!(
            "lagged '{}' with {} drivers over {} lags: {} rows retained",
            response,
            drivers.len(),
            lags.len(),
            trimmed_time.len()
        );

        Ok(LaggedTable::new(
            response.to_string(),
            drivers.iter().map(|d| d.to_string()).collect(),
            lags,
            columns,
            series.time_name().to_string(),
            trimmed_time,
        ))
    }

    /// Indices of the rows inside the configured time window.
    fn window_rows(&self, series: &TimeSeriesTable) -> Result<Vec<usize>, LagError> {
        let time = series.time();
        match self.config.time_window {
            None => Ok((0..time.len()).collect()),
            Some((min, max)) => {
                if min > max {
                    return Err(LagError::EmptyWindow { min, max });
                }
                let observed_min = time[0];
                let observed_max = time[time.len() - 1];
                if min < observed_min || max > observed_max {
                    return Err(LagError::WindowOutOfRange {
                        min,
                        max,
                        observed_min,
                        observed_max,
                    });
                }
                let rows: Vec<usize> = (0..time.len())
                    .filter(|&i| time[i] >= min && time[i] <= max)
                    .collect();
                if rows.len() < 2 {
                    return Err(LagError::EmptyWindow { min, max });
                }
                Ok(rows)
            }
        }
    }

    /// Shift one source column by `offset` rows in the direction implied by
    /// `oldest_first`, returning the trimmed aligned values.
    fn shift(&self, source: &[f64], rows: &[usize], offset: usize, out_rows: usize) -> Vec<f64> {
        let max_offset = rows.len() - out_rows;
        (0..out_rows)
            .map(|j| {
                let idx = if self.config.oldest_first {
                    // Row 0 oldest: the past of row j sits at lower indices.
                    rows[j + max_offset - offset]
                } else {
                    // Most recent first: the past sits at higher indices.
                    rows[j + offset]
                };
                source[idx]
            })
            .collect()
    }
}

/// Sort, dedup, and validate the lag set; inject lag 0 when absent.
fn validate_lags(lags: &[f64]) -> Result<Vec<f64>, LagError> {
    if lags.is_empty() {
        return Err(LagError::EmptyLags);
    }
    let mut lags = lags.to_vec();
    for &lag in &lags {
        if !(lag >= 0.0) {
            return Err(LagError::NegativeLag { lag });
        }
    }
    lags.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    lags.dedup();
    if lags[0] != 0.0 {
        lags.insert(0, 0.0);
    }
    if lags.len() > 2 {
        let diffs: Vec<f64> = lags.windows(2).map(|w| w[1] - w[0]).collect();
        let spread = stats::sample_sd(&diffs);
        if spread > LAG_REGULARITY_TOL * stats::mean(&diffs).abs() {
            return Err(LagError::IrregularLags { spread });
        }
    }
    Ok(lags)
}

/// Remove every row holding a NaN in any column, keeping time aligned.
fn drop_nan_rows(columns: Vec<LaggedColumn>, time: Vec<f64>) -> (Vec<LaggedColumn>, Vec<f64>) {
    let keep: Vec<bool> = (0..time.len())
        .map(|i| columns.iter().all(|c| c.values[i].is_finite()))
        .collect();
    if keep.iter().all(|&k| k) {
        return (columns, time);
    }
    let filter = |values: &[f64]| -> Vec<f64> {
        values
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(v, _)| *v)
            .collect()
    };
    let columns = columns
        .into_iter()
        .map(|c| LaggedColumn {
            values: filter(&c.values),
            ..c
        })
        .collect();
    let time = filter(&time);
    (columns, time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> TimeSeriesTable {
        let time: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let pollen: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();
        let temp: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        TimeSeriesTable::new(
            "age",
            time,
            vec![("pollen".to_string(), pollen), ("temp".to_string(), temp)],
        )
        .unwrap()
    }

    #[test]
    fn test_row_count_matches_max_lag() {
        let s = series(20);
        let lagged = LagTransformer::new(vec![0.0, 1.0, 2.0, 3.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap();
        assert_eq!(lagged.n_rows(), 20 - 3);
        assert_eq!(lagged.columns().len(), 2 * 4);
        assert!(lagged
            .columns()
            .iter()
            .all(|c| c.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_zero_lag_round_trip() {
        let s = series(12);
        let lagged = LagTransformer::new(vec![0.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap();
        assert_eq!(lagged.n_rows(), 12);
        assert_eq!(
            lagged.column("pollen", 0.0).unwrap().values,
            s.column("pollen").unwrap()
        );
        assert_eq!(
            lagged.column("temp", 0.0).unwrap().values,
            s.column("temp").unwrap()
        );
    }

    #[test]
    fn test_shift_direction_most_recent_first() {
        // Most recent sample first (ages ascending): the value 2 steps into
        // the past of row i sits at row i + 2.
        let s = series(10);
        let lagged = LagTransformer::new(vec![0.0, 1.0, 2.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap();
        let temp = s.column("temp").unwrap();
        let shifted = &lagged.column("temp", 2.0).unwrap().values;
        for i in 0..lagged.n_rows() {
            assert_eq!(shifted[i], temp[i + 2]);
        }
    }

    #[test]
    fn test_reversal_with_flag_flip_is_identity() {
        let n = 14;
        let s = series(n);
        let lags = vec![0.0, 1.0, 2.0];
        let forward = LagTransformer::with_config(LagConfig {
            lags: lags.clone(),
            oldest_first: false,
            ..LagConfig::default()
        })
        .transform(&s, "pollen", &["temp"])
        .unwrap();

        // Reverse the rows (relabelling the regular index) and flip the flag.
        let rev = |name: &str| -> Vec<f64> {
            s.column(name).unwrap().iter().rev().copied().collect()
        };
        let reversed = TimeSeriesTable::new(
            "age",
            (0..n).map(|i| i as f64).collect(),
            vec![
                ("pollen".to_string(), rev("pollen")),
                ("temp".to_string(), rev("temp")),
            ],
        )
        .unwrap();
        let backward = LagTransformer::with_config(LagConfig {
            lags,
            oldest_first: true,
            ..LagConfig::default()
        })
        .transform(&reversed, "pollen", &["temp"])
        .unwrap();

        assert_eq!(forward.n_rows(), backward.n_rows());
        for fc in forward.columns() {
            let bc = backward.column(&fc.variable, fc.lag).unwrap();
            let mirrored: Vec<f64> = bc.values.iter().rev().copied().collect();
            assert_eq!(fc.values, mirrored);
        }
    }

    #[test]
    fn test_irregular_lags_rejected_before_shifting() {
        let s = series(10);
        let err = LagTransformer::new(vec![0.0, 1.0, 3.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap_err();
        assert!(matches!(err, LagError::IrregularLags { .. }));
    }

    #[test]
    fn test_zero_lag_injected() {
        let s = series(10);
        let lagged = LagTransformer::new(vec![1.0, 2.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap();
        assert_eq!(lagged.lags(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_offset_collision_rejected() {
        // Step is 1.0, so lags 1.0 and 1.2 collapse onto the same offset.
        let s = series(10);
        let err = LagTransformer::new(vec![0.0, 1.0, 1.2])
            .transform(&s, "pollen", &["temp"])
            .unwrap_err();
        // 1.2 is also an irregular sequence; build a collision that survives
        // the regularity check instead.
        assert!(matches!(
            err,
            LagError::IrregularLags { .. } | LagError::OffsetCollision { .. }
        ));

        let time: Vec<f64> = (0..10).map(|i| i as f64 * 10.0).collect();
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let s = TimeSeriesTable::new(
            "age",
            time,
            vec![("r".to_string(), x.clone()), ("d".to_string(), x)],
        )
        .unwrap();
        // Step 10: lags {0, 2, 4} all round to offset 0.
        let err = LagTransformer::new(vec![0.0, 2.0, 4.0])
            .transform(&s, "r", &["d"])
            .unwrap_err();
        assert!(matches!(err, LagError::OffsetCollision { .. }));
    }

    #[test]
    fn test_time_window_validation() {
        let s = series(10);
        let err = LagTransformer::with_config(LagConfig {
            lags: vec![0.0, 1.0],
            time_window: Some((2.0, 20.0)),
            ..LagConfig::default()
        })
        .transform(&s, "pollen", &["temp"])
        .unwrap_err();
        assert!(matches!(err, LagError::WindowOutOfRange { .. }));

        let lagged = LagTransformer::with_config(LagConfig {
            lags: vec![0.0, 1.0],
            time_window: Some((2.0, 7.0)),
            ..LagConfig::default()
        })
        .transform(&s, "pollen", &["temp"])
        .unwrap();
        // 6 rows inside the window, one lost to the lag-1 shift.
        assert_eq!(lagged.n_rows(), 5);
        assert!(lagged.time().iter().all(|t| (2.0..=7.0).contains(t)));
    }

    #[test]
    fn test_missing_column_rejected() {
        let s = series(10);
        let err = LagTransformer::new(vec![0.0, 1.0])
            .transform(&s, "pollen", &["humidity"])
            .unwrap_err();
        assert!(matches!(
            err,
            LagError::Table(TableError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_no_drivers_rejected() {
        let s = series(10);
        let err = LagTransformer::new(vec![0.0]).transform(&s, "pollen", &[]).unwrap_err();
        assert!(matches!(err, LagError::NoDrivers));
    }

    #[test]
    fn test_nan_rows_dropped() {
        let time: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let mut pollen: Vec<f64> = (0..12).map(|i| i as f64).collect();
        pollen[5] = f64::NAN;
        let temp: Vec<f64> = (0..12).map(|i| i as f64 * 2.0).collect();
        let s = TimeSeriesTable::new(
            "age",
            time,
            vec![("pollen".to_string(), pollen), ("temp".to_string(), temp)],
        )
        .unwrap();
        let lagged = LagTransformer::new(vec![0.0, 1.0])
            .transform(&s, "pollen", &["temp"])
            .unwrap();
        // 11 rows after trimming; the NaN source value taints two of them
        // (as lag 0 of one row and lag 1 of another).
        assert_eq!(lagged.n_rows(), 9);
        assert!(lagged
            .columns()
            .iter()
            .all(|c| c.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_scale_option() {
        let s = series(30);
        let lagged = LagTransformer::with_config(LagConfig {
            lags: vec![0.0, 1.0],
            scale: true,
            ..LagConfig::default()
        })
        .transform(&s, "pollen", &["temp"])
        .unwrap();
        for column in lagged.columns() {
            assert!(crate::stats::mean(&column.values).abs() < 1e-9);
            let sd = crate::stats::sample_sd(&column.values);
            assert!((sd - 1.0).abs() < 1e-9, "sd {sd} for {}", column.label());
        }
        // Time is never scaled.
        assert_eq!(lagged.time()[0], 0.0);
    }
}
