//! # ecomem-forest
//!
//! Reference backend for the `ecomem-core` importance-oracle contract: a
//! from-scratch regression random forest with out-of-bag permutation
//! importance.
//!
//! Each tree grows on a bootstrap sample; importance of a feature is the
//! mean increase in out-of-bag mean squared error when that feature's values
//! are permuted among the out-of-bag rows, optionally divided by its
//! standard error across trees (scale-normalized, the form the memory
//! estimator requests). Predictions are in-sample ensemble means.
//!
//! Everything stochastic — bootstrap draws, candidate-feature sampling,
//! permutations — derives from the seed carried by the fit request, so a
//! given request always returns the same output.

mod tree;

use ecomem_core::oracle::{ImportanceOracle, OracleError, OracleOutput, OracleRequest};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use tree::RegressionTree;

/// Mixing constant for deriving independent per-tree seeds.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Forest shape options beyond what the fit request carries.
#[derive(Debug, Clone)]
pub struct ForestConfig {
    /// Candidate features per split; defaults to ⌈p / 3⌉ (regression rule).
    pub mtry: Option<usize>,
    /// Divide each importance by its standard error across trees.
    pub scaled_importance: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            mtry: None,
            scaled_importance: true,
        }
    }
}

/// Regression random forest implementing [`ImportanceOracle`].
#[derive(Debug, Clone, Default)]
pub struct RandomForestOracle {
    config: ForestConfig,
}

/// Per-tree fit artifacts.
struct FittedTree {
    tree: RegressionTree,
    /// MSE increase per feature on the out-of-bag rows; None when the
    /// bootstrap happened to cover every row.
    oob_deltas: Option<Vec<f64>>,
}

impl RandomForestOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ForestConfig) -> Self {
        Self { config }
    }

    fn fit_one(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        mtry: usize,
        min_leaf: usize,
        seed: u64,
    ) -> FittedTree {
        let n = x.nrows();
        let p = x.ncols();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut in_bag = vec![false; n];
        let bootstrap: Vec<usize> = (0..n)
            .map(|_| {
                let i = rng.gen_range(0..n);
                in_bag[i] = true;
                i
            })
            .collect();
        let oob: Vec<usize> = (0..n).filter(|&i| !in_bag[i]).collect();

        let tree = RegressionTree::fit(x, y, &bootstrap, mtry, min_leaf, &mut rng);

        let oob_deltas = if oob.is_empty() {
            None
        } else {
            let base_mse = mean_squared_error(&tree, x, y, &oob, None);
            let deltas = (0..p)
                .map(|feature| {
                    let mut permuted: Vec<f64> =
                        oob.iter().map(|&i| x[[i, feature]]).collect();
                    permuted.shuffle(&mut rng);
                    let mse = mean_squared_error(&tree, x, y, &oob, Some((feature, &permuted)));
                    mse - base_mse
                })
                .collect();
            Some(deltas)
        };

        FittedTree { tree, oob_deltas }
    }
}

/// Out-of-bag MSE of one tree, optionally substituting permuted values for a
/// single feature.
fn mean_squared_error(
    tree: &RegressionTree,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    rows: &[usize],
    permuted: Option<(usize, &[f64])>,
) -> f64 {
    let mut acc = 0.0;
    for (slot, &i) in rows.iter().enumerate() {
        let prediction = tree.predict_with(|feature| match permuted {
            Some((f, values)) if f == feature => values[slot],
            _ => x[[i, feature]],
        });
        let err = prediction - y[i];
        acc += err * err;
    }
    acc / rows.len() as f64
}

impl ImportanceOracle for RandomForestOracle {
    fn fit_importance(&self, request: &OracleRequest<'_>) -> Result<OracleOutput, OracleError> {
        let n = request.x.nrows();
        let p = request.x.ncols();
        if n < 2 {
            return Err(OracleError::Fit(format!(
                "forest needs at least 2 rows, got {n}"
            )));
        }
        if p == 0 {
            return Err(OracleError::Fit("forest needs at least 1 feature".to_string()));
        }
        if request.y.len() != n {
            return Err(OracleError::Fit(format!(
                "target has {} values for {n} rows",
                request.y.len()
            )));
        }

        let trees = request.trees.max(1);
        let min_leaf = request.min_leaf.max(1);
        let mtry = self
            .config
            .mtry
            .unwrap_or_else(|| p.div_ceil(3))
            .clamp(1, p);
        log::debug!(
            "fitting forest: {trees} trees over {n} rows x {p} features (mtry {mtry}, min_leaf {min_leaf})"
        );

        let fit_all = || -> Vec<FittedTree> {
            (0..trees)
                .into_par_iter()
                .map(|t| {
                    let seed = request
                        .seed
                        .wrapping_add((t as u64).wrapping_mul(SEED_MIX));
                    self.fit_one(request.x, request.y, mtry, min_leaf, seed)
                })
                .collect()
        };
        let fitted = if request.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(request.threads)
                .build()
                .map_err(|e| OracleError::Fit(e.to_string()))?;
            pool.install(fit_all)
        } else {
            fit_all()
        };

        // Permutation importance: mean OOB-MSE increase across the trees that
        // held out-of-bag rows, scale-normalized on request.
        let mut importance = vec![0.0; p];
        for feature in 0..p {
            let deltas: Vec<f64> = fitted
                .iter()
                .filter_map(|f| f.oob_deltas.as_ref().map(|d| d[feature]))
                .collect();
            if deltas.is_empty() {
                continue;
            }
            let mean = ecomem_core::stats::mean(&deltas);
            importance[feature] = if self.config.scaled_importance {
                let se = ecomem_core::stats::sample_sd(&deltas) / (deltas.len() as f64).sqrt();
                if se < f64::EPSILON {
                    mean
                } else {
                    mean / se
                }
            } else {
                mean
            };
        }

        let predictions: Vec<f64> = (0..n)
            .map(|i| {
                let sum: f64 = fitted
                    .iter()
                    .map(|f| f.tree.predict_with(|feature| request.x[[i, feature]]))
                    .sum();
                sum / fitted.len() as f64
            })
            .collect();

        Ok(OracleOutput {
            importance,
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecomem_core::oracle::ColumnId;
    use ndarray::{Array1, Array2};
    use rand_distr::StandardNormal;

    fn request<'a>(
        x: &'a Array2<f64>,
        y: &'a Array1<f64>,
        names: &'a [ColumnId],
        trees: usize,
        seed: u64,
    ) -> OracleRequest<'a> {
        OracleRequest {
            x: x.view(),
            names,
            y: y.view(),
            min_leaf: 5,
            trees,
            threads: 0,
            seed,
        }
    }

    fn signal_and_noise(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let signal: f64 = rng.sample(StandardNormal);
            let noise: f64 = rng.sample(StandardNormal);
            x[[i, 0]] = signal;
            x[[i, 1]] = noise;
            y[i] = 2.0 * signal;
        }
        (x, y)
    }

    #[test]
    fn test_signal_feature_outranks_noise() {
        let (x, y) = signal_and_noise(200, 3);
        let names = vec![ColumnId::new("signal", 0.0), ColumnId::new("noise", 0.0)];
        let output = RandomForestOracle::new()
            .fit_importance(&request(&x, &y, &names, 100, 0))
            .unwrap();
        assert_eq!(output.importance.len(), 2);
        assert_eq!(output.predictions.len(), 200);
        assert!(
            output.importance[0] > output.importance[1],
            "signal {} vs noise {}",
            output.importance[0],
            output.importance[1]
        );
        let r = ecomem_core::stats::pearson(&output.predictions, y.as_slice().unwrap());
        assert!(r * r > 0.8, "in-sample pseudo-R2 {}", r * r);
    }

    #[test]
    fn test_same_seed_same_output() {
        let (x, y) = signal_and_noise(80, 9);
        let names = vec![ColumnId::new("a", 0.0), ColumnId::new("b", 0.0)];
        let oracle = RandomForestOracle::new();
        let first = oracle.fit_importance(&request(&x, &y, &names, 50, 7)).unwrap();
        let second = oracle.fit_importance(&request(&x, &y, &names, 50, 7)).unwrap();
        assert_eq!(first.importance, second.importance);
        assert_eq!(first.predictions, second.predictions);

        let other = oracle.fit_importance(&request(&x, &y, &names, 50, 8)).unwrap();
        assert_ne!(first.importance, other.importance);
    }

    #[test]
    fn test_too_few_rows_rejected() {
        let x = Array2::zeros((1, 1));
        let y = Array1::zeros(1);
        let names = vec![ColumnId::new("a", 0.0)];
        let err = RandomForestOracle::new()
            .fit_importance(&request(&x, &y, &names, 10, 0))
            .unwrap_err();
        assert!(matches!(err, OracleError::Fit(_)));
    }

    #[test]
    fn test_unscaled_importance_option() {
        let (x, y) = signal_and_noise(120, 5);
        let names = vec![ColumnId::new("a", 0.0), ColumnId::new("b", 0.0)];
        let oracle = RandomForestOracle::with_config(ForestConfig {
            scaled_importance: false,
            ..ForestConfig::default()
        });
        let output = oracle.fit_importance(&request(&x, &y, &names, 60, 1)).unwrap();
        assert!(output.importance[0] > output.importance[1]);
    }
}
