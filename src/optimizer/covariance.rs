// src/optimizer/covariance.rs
//
// Covariance estimators over a complete returns matrix (no NaN).

use crate::error::PipelineError;
use nalgebra::DMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How the covariance matrix is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceEstimator {
    /// Unbiased sample covariance
    Sample,
    /// Ledoit-Wolf shrinkage towards a scaled identity
    LedoitWolf,
}

impl CovarianceEstimator {
    pub fn estimate(&self, returns: &Array2<f64>) -> Result<DMatrix<f64>, PipelineError> {
        match self {
            CovarianceEstimator::Sample => sample_covariance(returns),
            CovarianceEstimator::LedoitWolf => ledoit_wolf(returns).map(|(cov, _)| cov),
        }
    }
}

fn to_centered(returns: &Array2<f64>) -> DMatrix<f64> {
    let (n, p) = returns.dim();
    let mut x = DMatrix::<f64>::zeros(n, p);
    for j in 0..p {
        let mean = returns.column(j).sum() / n as f64;
        for i in 0..n {
            x[(i, j)] = returns[[i, j]] - mean;
        }
    }
    x
}

/// Sample covariance with n - 1 in the denominator.
pub fn sample_covariance(returns: &Array2<f64>) -> Result<DMatrix<f64>, PipelineError> {
    let n = returns.nrows();
    if n < 2 {
        return Err(PipelineError::DataGap(format!(
            "covariance needs at least 2 return observations, got {}",
            n
        )));
    }
    let x = to_centered(returns);
    Ok(x.transpose() * &x / (n as f64 - 1.0))
}

/// Ledoit-Wolf shrunk covariance and the shrinkage intensity used.
///
/// Shrinks the maximum-likelihood covariance S towards mu * I, mu = tr(S) / p.
pub fn ledoit_wolf(returns: &Array2<f64>) -> Result<(DMatrix<f64>, f64), PipelineError> {
    let (n, p) = returns.dim();
    if n < 2 {
        return Err(PipelineError::DataGap(format!(
            "covariance needs at least 2 return observations, got {}",
            n
        )));
    }
    let nf = n as f64;
    let pf = p as f64;

    let x = to_centered(returns);
    let emp_cov = x.transpose() * &x / nf;
    let mu = emp_cov.trace() / pf;

    let x2 = x.map(|v| v * v);
    let beta_sum = (x2.transpose() * &x2).sum();
    let delta_sum = emp_cov.map(|v| v * v).sum();

    let beta = (beta_sum / nf - delta_sum) / (pf * nf);
    let delta = (delta_sum - 2.0 * mu * emp_cov.trace() + pf * mu * mu) / pf;
    let beta = beta.min(delta);
    let shrinkage = if beta <= 0.0 || delta <= 0.0 { 0.0 } else { beta / delta };

    let target = DMatrix::<f64>::identity(p, p) * mu;
    Ok((emp_cov * (1.0 - shrinkage) + target * shrinkage, shrinkage))
}

/// Correlation matrix; fails on a zero-variance column.
pub fn correlation(cov: &DMatrix<f64>) -> Result<DMatrix<f64>, PipelineError> {
    let p = cov.nrows();
    let sd: Vec<f64> = (0..p).map(|i| cov[(i, i)].sqrt()).collect();
    if let Some(i) = sd.iter().position(|s| !(*s > 0.0)) {
        return Err(PipelineError::optimization(
            "correlation",
            format!("column {} has zero variance", i),
        ));
    }
    Ok(DMatrix::from_fn(p, p, |i, j| (cov[(i, j)] / (sd[i] * sd[j])).clamp(-1.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Array2<f64> {
        array![
            [0.01, 0.02, -0.01],
            [0.03, -0.01, 0.00],
            [-0.02, 0.01, 0.02],
            [0.00, 0.03, -0.02],
            [0.02, -0.02, 0.01],
        ]
    }

    #[test]
    fn test_sample_covariance_matches_definition() {
        let r = array![[1.0, 2.0], [3.0, 6.0]];
        let cov = sample_covariance(&r).unwrap();
        assert!((cov[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((cov[(1, 1)] - 8.0).abs() < 1e-12);
        assert!((cov[(0, 1)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ledoit_wolf_shrinks_off_diagonals() {
        let (shrunk, intensity) = ledoit_wolf(&sample()).unwrap();
        assert!((0.0..=1.0).contains(&intensity));
        let n = sample().nrows() as f64;
        let mle = sample_covariance(&sample()).unwrap() * ((n - 1.0) / n);
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    assert!(shrunk[(i, j)].abs() <= mle[(i, j)].abs() + 1e-15);
                }
            }
        }
        // trace is preserved
        assert!((shrunk.trace() - mle.trace()).abs() < 1e-12);
    }

    #[test]
    fn test_single_observation_is_data_gap() {
        let r = array![[0.01, 0.02]];
        assert!(matches!(sample_covariance(&r), Err(PipelineError::DataGap(_))));
        assert!(matches!(ledoit_wolf(&r), Err(PipelineError::DataGap(_))));
    }

    #[test]
    fn test_correlation_rejects_constant_column() {
        let r = array![[0.01, 0.0], [0.02, 0.0], [-0.01, 0.0]];
        let cov = sample_covariance(&r).unwrap();
        assert!(correlation(&cov).is_err());
    }
}
