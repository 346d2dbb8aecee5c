//! Regression tree
//!
//! CART-style tree grown on a bootstrap sample: axis-aligned splits chosen to
//! minimize the summed squared error of the two children, over a random
//! subset of `mtry` candidate features per node. Growth stops when a node
//! cannot host two children of `min_leaf` rows or its target variance
//! vanishes.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;

/// Numerical floor below which a node is treated as pure.
const MIN_SSE: f64 = 1e-12;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rows: &[usize],
        mtry: usize,
        min_leaf: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, rows.to_vec(), mtry, min_leaf, rng);
        tree
    }

    /// Evaluate the tree with an arbitrary feature accessor, so callers can
    /// substitute permuted values for a single feature without copying the
    /// matrix.
    pub fn predict_with(&self, feature: impl Fn(usize) -> f64) -> f64 {
        let mut node = 0usize;
        loop {
            match &self.nodes[node] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature: f,
                    threshold,
                    left,
                    right,
                } => {
                    node = if feature(*f) <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Grow one node over `rows`, returning its index.
    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rows: Vec<usize>,
        mtry: usize,
        min_leaf: usize,
        rng: &mut StdRng,
    ) -> usize {
        let n = rows.len();
        let sum: f64 = rows.iter().map(|&i| y[i]).sum();
        let mean = sum / n as f64;

        let sse: f64 = rows.iter().map(|&i| (y[i] - mean) * (y[i] - mean)).sum();
        if n < 2 * min_leaf || sse < MIN_SSE {
            self.nodes.push(Node::Leaf { value: mean });
            return self.nodes.len() - 1;
        }

        let best = self.best_split(x, y, &rows, mtry, min_leaf, rng);
        let Some((feature, threshold)) = best else {
            self.nodes.push(Node::Leaf { value: mean });
            return self.nodes.len() - 1;
        };

        let index = self.nodes.len();
        self.nodes.push(Node::Split {
            feature,
            threshold,
            left: 0,
            right: 0,
        });

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| x[[i, feature]] <= threshold);
        let left = self.grow(x, y, left_rows, mtry, min_leaf, rng);
        let right = self.grow(x, y, right_rows, mtry, min_leaf, rng);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[index]
        {
            *l = left;
            *r = right;
        }
        index
    }

    /// Best (feature, threshold) over `mtry` random candidate features, or
    /// None when no split leaves `min_leaf` rows on each side.
    fn best_split(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rows: &[usize],
        mtry: usize,
        min_leaf: usize,
        rng: &mut StdRng,
    ) -> Option<(usize, f64)> {
        let p = x.ncols();
        let candidates = rand::seq::index::sample(rng, p, mtry.min(p));

        let n = rows.len();
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order: Vec<usize> = Vec::with_capacity(n);
        for feature in candidates {
            order.clear();
            order.extend_from_slice(rows);
            order.sort_by(|&a, &b| {
                x[[a, feature]]
                    .partial_cmp(&x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            // Prefix scan: SSE of both children in one pass.
            let total_sum: f64 = order.iter().map(|&i| y[i]).sum();
            let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 1..n {
                let i = order[k - 1];
                left_sum += y[i];
                left_sq += y[i] * y[i];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let lo = x[[order[k - 1], feature]];
                let hi = x[[order[k], feature]];
                if !(hi > lo) {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / k as f64)
                    + (right_sq - right_sum * right_sum / (n - k) as f64);
                if best.map_or(true, |(_, _, s)| sse < s) {
                    best = Some((feature, (lo + hi) / 2.0, sse));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}
