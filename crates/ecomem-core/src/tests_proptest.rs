//! Property-based invariant suite for the lag/memory pipeline.

use proptest::prelude::*;

use crate::benchmark::BENCHMARK_VARIABLE;
use crate::features::extract_memory_features;
use crate::lag::LagTransformer;
use crate::stats;
use crate::summary::{MemoryRow, MemorySummary, PredictionSummary};
use crate::table::TimeSeriesTable;

fn series_strategy() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (12usize..48).prop_flat_map(|n| {
        (
            prop::collection::vec(-1000.0f64..1000.0, n),
            prop::collection::vec(-1000.0f64..1000.0, n),
        )
    })
}

proptest! {
    /// Lagging a regular series loses exactly `max_lag / step` rows and never
    /// leaves a missing value behind.
    #[test]
    fn prop_lag_row_count_and_no_nan(
        (response, driver) in series_strategy(),
        n_lags in 1usize..5,
    ) {
        let n = response.len();
        let time: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let series = TimeSeriesTable::new(
            "age",
            time,
            vec![("r".to_string(), response), ("d".to_string(), driver)],
        )
        .unwrap();
        let lags: Vec<f64> = (0..=n_lags).map(|l| l as f64).collect();
        let lagged = LagTransformer::new(lags).transform(&series, "r", &["d"]).unwrap();

        prop_assert_eq!(lagged.n_rows(), n - n_lags);
        for column in lagged.columns() {
            prop_assert_eq!(column.values.len(), n - n_lags);
            prop_assert!(column.values.iter().all(|v| v.is_finite()));
        }
    }

    /// Quantiles stay inside the observed range for any order statistic.
    #[test]
    fn prop_quantile_within_bounds(
        values in prop::collection::vec(-1e6f64..1e6, 1..64),
        q in 0.0f64..=1.0,
    ) {
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let v = stats::quantile(&values, q);
        prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
    }

    /// Length features are fractions and dominance fractions never sum past
    /// one, whatever the medians look like.
    #[test]
    fn prop_feature_bounds(
        endo in prop::collection::vec(-1.0f64..1.0, 3),
        exo in prop::collection::vec(-1.0f64..1.0, 4),
        bench in -0.5f64..0.5,
    ) {
        let mut memory = vec![
            MemoryRow { variable: "r".to_string(), lag: 1.0, median: endo[0], sd: 0.0, p05: 0.0, p95: 0.0 },
            MemoryRow { variable: "r".to_string(), lag: 2.0, median: endo[1], sd: 0.0, p05: 0.0, p95: 0.0 },
            MemoryRow { variable: "r".to_string(), lag: 3.0, median: endo[2], sd: 0.0, p05: 0.0, p95: 0.0 },
        ];
        for (i, value) in exo.iter().enumerate() {
            memory.push(MemoryRow {
                variable: "d".to_string(),
                lag: i as f64,
                median: *value,
                sd: 0.0,
                p05: 0.0,
                p95: 0.0,
            });
        }
        for lag in 0..4 {
            memory.push(MemoryRow {
                variable: BENCHMARK_VARIABLE.to_string(),
                lag: lag as f64,
                median: bench,
                sd: 0.0,
                p05: 0.0,
                p95: 0.0,
            });
        }
        let summary = MemorySummary {
            response: "r".to_string(),
            drivers: vec!["d".to_string()],
            memory,
            r2: vec![],
            predictions: PredictionSummary::default(),
        };

        let f = extract_memory_features(&summary, "r", "r", &["d"]).unwrap();
        prop_assert!((0.0..=1.0).contains(&f.length_endogenous));
        prop_assert!((0.0..=1.0).contains(&f.length_exogenous));
        prop_assert!(f.dominance_endogenous >= 0.0);
        prop_assert!(f.dominance_exogenous >= 0.0);
        prop_assert!(f.dominance_endogenous + f.dominance_exogenous <= 1.0 + 1e-12);
    }
}
