//! Regression-importance oracle contract
//!
//! The supervised learning engine is an external collaborator: anything that
//! can fit a regression of the lag-0 response on the remaining columns and
//! report permutation-based variable importance satisfies [`ImportanceOracle`].
//! The `ecomem-forest` crate ships a reference implementation; test suites use
//! lightweight deterministic stand-ins.

use ndarray::{ArrayView1, ArrayView2};
use thiserror::Error;

/// Tagged identity of one modeling column: the source variable plus the lag
/// at which it was shifted. Stored at construction time and never re-derived
/// by parsing column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnId {
    pub variable: String,
    pub lag: f64,
}

impl ColumnId {
    pub fn new(variable: impl Into<String>, lag: f64) -> Self {
        Self {
            variable: variable.into(),
            lag,
        }
    }

    /// Display label in the `<variable>__<lag>` convention.
    pub fn label(&self) -> String {
        format!("{}__{}", self.variable, self.lag)
    }
}

/// Errors surfaced by an oracle. All of them abort the estimator call that
/// issued the fit; there is no retry path.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle fit failed: {0}")]
    Fit(String),
    #[error("oracle returned {got} importance scores for {expected} features")]
    ImportanceShape { expected: usize, got: usize },
    #[error("oracle returned {got} predictions for {expected} rows")]
    PredictionShape { expected: usize, got: usize },
}

/// One fit request: the feature matrix (rows × features), the tagged feature
/// identities, the target, and the fit parameters forwarded from the
/// estimator configuration.
pub struct OracleRequest<'a> {
    pub x: ArrayView2<'a, f64>,
    pub names: &'a [ColumnId],
    pub y: ArrayView1<'a, f64>,
    /// Minimum observations per leaf/terminal node.
    pub min_leaf: usize,
    /// Ensemble size.
    pub trees: usize,
    /// Worker threads for the fit; 0 leaves the choice to the backend.
    pub threads: usize,
    /// Seed for every stochastic choice the backend makes.
    pub seed: u64,
}

/// Fit result: per-feature importance (index-aligned with
/// [`OracleRequest::names`]) and in-sample predictions for every row.
#[derive(Debug, Clone)]
pub struct OracleOutput {
    pub importance: Vec<f64>,
    pub predictions: Vec<f64>,
}

impl OracleOutput {
    /// Shape-check an output against the request that produced it.
    pub fn validate(&self, request: &OracleRequest<'_>) -> Result<(), OracleError> {
        if self.importance.len() != request.names.len() {
            return Err(OracleError::ImportanceShape {
                expected: request.names.len(),
                got: self.importance.len(),
            });
        }
        if self.predictions.len() != request.y.len() {
            return Err(OracleError::PredictionShape {
                expected: request.y.len(),
                got: self.predictions.len(),
            });
        }
        Ok(())
    }
}

/// A pluggable regression backend with permutation importance.
pub trait ImportanceOracle: Sync {
    fn fit_importance(&self, request: &OracleRequest<'_>) -> Result<OracleOutput, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_column_label() {
        assert_eq!(ColumnId::new("temp", 3.0).label(), "temp__3");
        assert_eq!(ColumnId::new("temp", 0.5).label(), "temp__0.5");
    }

    #[test]
    fn test_output_validation() {
        let x = Array2::<f64>::zeros((4, 2));
        let y = Array1::<f64>::zeros(4);
        let names = vec![ColumnId::new("a", 0.0), ColumnId::new("b", 1.0)];
        let request = OracleRequest {
            x: x.view(),
            names: &names,
            y: y.view(),
            min_leaf: 5,
            trees: 10,
            threads: 0,
            seed: 0,
        };
        let ok = OracleOutput {
            importance: vec![0.0, 0.0],
            predictions: vec![0.0; 4],
        };
        assert!(ok.validate(&request).is_ok());

        let bad = OracleOutput {
            importance: vec![0.0],
            predictions: vec![0.0; 4],
        };
        assert!(matches!(
            bad.validate(&request),
            Err(OracleError::ImportanceShape { expected: 2, got: 1 })
        ));
    }
}
