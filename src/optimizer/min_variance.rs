// src/optimizer/min_variance.rs
//
// Long-only, fully-invested minimum-variance weights.
//
// Active-set solve: the closed-form minimum-variance solution
// w = S^-1 1 / (1' S^-1 1) is computed on the free set; the most negative
// weight is pinned to zero until all free weights are non-negative, then
// pinned instruments whose marginal variance is below the multiplier are
// released (KKT check).

use super::covariance::CovarianceEstimator;
use super::portfolio::Portfolio;
use super::returns::ReturnsMatrix;
use crate::error::PipelineError;
use crate::traits::RiskOptimizer;
use log::debug;
use nalgebra::{DMatrix, DVector};

const MIN_VARIANCE: f64 = 1e-14;
const KKT_TOLERANCE: f64 = 1e-12;

/// Solves the unconstrained minimum-variance problem on `free`.
fn solve_free(method: &str, cov: &DMatrix<f64>, free: &[usize]) -> Result<Vec<f64>, PipelineError> {
    let k = free.len();
    let sub = DMatrix::from_fn(k, k, |i, j| cov[(free[i], free[j])]);
    let chol = sub.cholesky().ok_or_else(|| {
        PipelineError::optimization(method, "covariance matrix is not positive definite")
    })?;
    let x = chol.solve(&DVector::from_element(k, 1.0));
    let total = x.sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(PipelineError::optimization(method, "degenerate covariance matrix"));
    }
    Ok(x.iter().map(|v| v / total).collect())
}

/// Long-only minimum-variance weights for a covariance matrix.
pub fn min_variance_weights(method: &str, cov: &DMatrix<f64>) -> Result<Vec<f64>, PipelineError> {
    let n = cov.nrows();
    if n == 0 {
        return Err(PipelineError::optimization(method, "no instruments"));
    }
    if let Some(i) = (0..n).find(|&i| !(cov[(i, i)] > MIN_VARIANCE)) {
        return Err(PipelineError::optimization(
            method,
            format!("instrument {} has zero variance", i),
        ));
    }
    if n == 1 {
        return Ok(vec![1.0]);
    }

    let mut free: Vec<usize> = (0..n).collect();
    let max_iterations = 4 * n;

    for iteration in 0..max_iterations {
        let w_free = solve_free(method, cov, &free)?;

        // Pin the most negative weight and re-solve
        let most_negative = w_free
            .iter()
            .enumerate()
            .filter(|(_, w)| **w < 0.0)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(pos, _)| pos);
        if let Some(pos) = most_negative {
            free.remove(pos);
            continue;
        }

        let mut weights = vec![0.0; n];
        for (pos, &i) in free.iter().enumerate() {
            weights[i] = w_free[pos];
        }

        // KKT: every pinned instrument must have marginal variance >= multiplier
        let w = DVector::from_vec(weights.clone());
        let grad = cov * &w;
        let lambda = w.dot(&grad);
        let violator = (0..n)
            .filter(|i| !free.contains(i))
            .filter(|&i| grad[i] < lambda - KKT_TOLERANCE)
            .min_by(|&a, &b| grad[a].total_cmp(&grad[b]));

        match violator {
            Some(i) => {
                debug!("{}: releasing instrument {} at iteration {}", method, i, iteration);
                free.push(i);
                free.sort_unstable();
            }
            None => return Ok(weights),
        }
    }

    Err(PipelineError::optimization(
        method,
        format!("active set did not converge in {} iterations", max_iterations),
    ))
}

/// Minimum-variance risk function over a chosen covariance estimator.
#[derive(Debug, Clone)]
pub struct MinimumVariance {
    name: String,
    estimator: CovarianceEstimator,
    annualization_factor: f64,
}

impl MinimumVariance {
    pub fn new(name: impl Into<String>, estimator: CovarianceEstimator, annualization_factor: f64) -> Self {
        Self {
            name: name.into(),
            estimator,
            annualization_factor,
        }
    }

    pub fn sample(annualization_factor: f64) -> Self {
        Self::new("mean_variance", CovarianceEstimator::Sample, annualization_factor)
    }

    pub fn ledoit_wolf(annualization_factor: f64) -> Self {
        Self::new("ledoit_wolf", CovarianceEstimator::LedoitWolf, annualization_factor)
    }
}

/// Rows without gaps, or a data gap error when none are left.
pub(crate) fn usable_rows(method: &str, returns: &ReturnsMatrix) -> Result<ReturnsMatrix, PipelineError> {
    if returns.n_instruments() == 0 {
        return Err(PipelineError::DataGap(format!("{}: no instruments to optimize", method)));
    }
    let complete = returns.complete_rows();
    if complete.n_periods() == 0 {
        return Err(PipelineError::DataGap(format!(
            "{}: no date has returns for all {} instruments",
            method,
            returns.n_instruments()
        )));
    }
    Ok(complete)
}

impl RiskOptimizer for MinimumVariance {
    fn name(&self) -> &str {
        &self.name
    }

    fn optimize(&self, returns: &ReturnsMatrix) -> Result<(Vec<f64>, Portfolio), PipelineError> {
        let complete = usable_rows(&self.name, returns)?;
        let cov = self.estimator.estimate(&complete.values)?;
        let weights = min_variance_weights(&self.name, &cov)?;
        let portfolio = Portfolio::from_weights(&complete, &weights, self.annualization_factor);
        Ok((weights, portfolio))
    }
}
