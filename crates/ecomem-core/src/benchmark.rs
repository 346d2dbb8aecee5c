//! Random Benchmark Generator
//!
//! Produces the synthetic nuisance column used as a null-model comparator by
//! the memory estimator. A predictor with no causal link to the response
//! establishes the importance threshold real memory has to clear.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::stats;

/// Variable tag of the benchmark column in estimator outputs.
pub const BENCHMARK_VARIABLE: &str = "random";

/// Kind of nuisance column to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMode {
    /// I.i.d. standard-normal draws.
    WhiteNoise,
    /// Standard-normal draws smoothed by a circular moving average with a
    /// window drawn uniformly from `1..=n/4` on every call, then min-max
    /// rescaled to [0, 1]. Consecutive repetitions see different amounts of
    /// smoothing and hence a benchmark of varying severity.
    Autocorrelated,
    /// No benchmark column at all.
    None,
}

impl BenchmarkMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, BenchmarkMode::None)
    }
}

/// Generate one benchmark column of length `n`, or `None` when the mode is
/// [`BenchmarkMode::None`].
pub fn generate_benchmark(n: usize, mode: BenchmarkMode, rng: &mut StdRng) -> Option<Vec<f64>> {
    match mode {
        BenchmarkMode::None => None,
        BenchmarkMode::WhiteNoise => {
            Some((0..n).map(|_| rng.sample(StandardNormal)).collect())
        }
        BenchmarkMode::Autocorrelated => {
            let noise: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
            if n == 0 {
                return Some(noise);
            }
            let window = rng.gen_range(1..=(n / 4).max(1));
            let smoothed = stats::circular_moving_average(&noise, window);
            Some(stats::min_max_normalize(&smoothed))
        }
    }
}
