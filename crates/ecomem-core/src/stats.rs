//! Shared numeric helpers
//!
//! Small statistical routines used across the pipeline: moments, quantiles,
//! correlation, normalization, and circular smoothing. All helpers assume
//! finite inputs; callers drop NaN rows before reaching them.

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Returns 0.0 for fewer than
/// two values.
pub fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Linear-interpolation quantile (R type 7). `q` is clamped to [0, 1].
/// Returns 0.0 for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Median via [`quantile`] at 0.5.
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Pearson correlation coefficient. Returns 0.0 when either side is constant
/// or the slices are shorter than two elements.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    let denom = (va * vb).sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        cov / denom
    }
}

/// Rescale values into [0, 1]. A constant series maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range < f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// In-place z-score normalization (mean 0, unit variance). A constant column
/// is centered but left unscaled.
pub fn z_score_normalize(values: &mut [f64]) {
    let m = mean(values);
    let sd = sample_sd(values);
    if sd < f64::EPSILON {
        for v in values.iter_mut() {
            *v -= m;
        }
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - m) / sd;
    }
}

/// Centered moving average with circular (wrap-around) boundaries, so the
/// output length always equals the input length. Even window lengths are
/// centered to within half a sample.
pub fn circular_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || window <= 1 {
        return values.to_vec();
    }
    let window = window.min(n);
    let half = window / 2;
    let mut out = vec![0.0; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for k in 0..window {
            let idx = (i + k + n - half) % n;
            acc += values[idx];
        }
        *slot = acc / window as f64;
    }
    out
}

/// First-order (lag 1) autocorrelation coefficient.
pub fn lag1_autocorrelation(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    pearson(&values[..values.len() - 1], &values[1..])
}
