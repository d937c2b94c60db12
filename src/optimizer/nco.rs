// src/optimizer/nco.rs
//
// Nested clustered optimization.
// Instruments are grouped by average-linkage clustering on the correlation
// distance sqrt(0.5 * (1 - rho)); minimum variance is solved inside each
// cluster and clusters share the capital equally.

use super::covariance::{correlation, sample_covariance};
use super::min_variance::{min_variance_weights, usable_rows};
use super::portfolio::Portfolio;
use super::returns::ReturnsMatrix;
use crate::error::PipelineError;
use crate::traits::RiskOptimizer;
use log::debug;
use nalgebra::DMatrix;

/// Average-linkage agglomerative clustering down to `k` clusters.
///
/// Clusters are returned with their members sorted, ordered by first member.
pub fn average_linkage(distance: &DMatrix<f64>, k: usize) -> Vec<Vec<usize>> {
    let n = distance.nrows();
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let k = k.max(1);

    while clusters.len() > k {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let mut total = 0.0;
                for &i in &clusters[a] {
                    for &j in &clusters[b] {
                        total += distance[(i, j)];
                    }
                }
                let avg = total / (clusters[a].len() * clusters[b].len()) as f64;
                if best.map_or(true, |(_, _, d)| avg < d) {
                    best = Some((a, b, avg));
                }
            }
        }
        let Some((a, b, _)) = best else { break };
        let merged = clusters.remove(b);
        clusters[a].extend(merged);
        clusters[a].sort_unstable();
    }

    clusters.sort_by_key(|c| c.first().copied().unwrap_or(usize::MAX));
    clusters
}

#[derive(Debug, Clone)]
pub struct NestedClusters {
    max_clusters: Option<usize>,
    annualization_factor: f64,
}

impl NestedClusters {
    /// `max_clusters` of None uses ceil(sqrt(n)) clusters.
    pub fn new(max_clusters: Option<usize>, annualization_factor: f64) -> Self {
        Self {
            max_clusters,
            annualization_factor,
        }
    }

    fn cluster_count(&self, n: usize) -> usize {
        self.max_clusters
            .unwrap_or_else(|| (n as f64).sqrt().ceil() as usize)
            .clamp(1, n.max(1))
    }
}

impl RiskOptimizer for NestedClusters {
    fn name(&self) -> &str {
        "nco"
    }

    fn optimize(&self, returns: &ReturnsMatrix) -> Result<(Vec<f64>, Portfolio), PipelineError> {
        let complete = usable_rows(self.name(), returns)?;
        let cov = sample_covariance(&complete.values)?;
        let corr = correlation(&cov).map_err(|e| match e {
            PipelineError::Optimization { reason, .. } => PipelineError::optimization(self.name(), reason),
            other => other,
        })?;
        let distance = corr.map(|rho| (0.5 * (1.0 - rho)).max(0.0).sqrt());

        let n = complete.n_instruments();
        let clusters = average_linkage(&distance, self.cluster_count(n));
        let share = 1.0 / clusters.len() as f64;

        let mut weights = vec![0.0; n];
        for cluster in &clusters {
            let sub = DMatrix::from_fn(cluster.len(), cluster.len(), |i, j| cov[(cluster[i], cluster[j])]);
            let inner = min_variance_weights(self.name(), &sub)?;
            for (&i, w) in cluster.iter().zip(inner) {
                weights[i] = share * w;
            }
            debug!(
                "nco cluster {:?}",
                cluster.iter().map(|&i| complete.instruments[i].as_str()).collect::<Vec<_>>()
            );
        }

        let portfolio = Portfolio::from_weights(&complete, &weights, self.annualization_factor);
        Ok((weights, portfolio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use ndarray::Array2;

    #[test]
    fn test_average_linkage_groups_close_points() {
        let d = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.1, 0.9, 0.8, //
                0.1, 0.0, 0.85, 0.9, //
                0.9, 0.85, 0.0, 0.2, //
                0.8, 0.9, 0.2, 0.0,
            ],
        );
        let clusters = average_linkage(&d, 2);
        assert_eq!(clusters, vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(average_linkage(&d, 4).len(), 4);
        assert_eq!(average_linkage(&d, 1), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_nco_weights_split_across_clusters() {
        // Two pairs: A/B move together, C/D move together
        let base = [0.02, -0.01, 0.03, -0.02, 0.01, 0.00, -0.03, 0.02];
        let other = [-0.01, 0.02, 0.00, 0.01, -0.02, 0.03, 0.01, -0.01];
        let values = Array2::from_shape_fn((8, 4), |(i, j)| match j {
            0 => base[i],
            1 => base[i] * 1.1 + 0.001 * (i as f64 % 3.0),
            2 => other[i],
            _ => other[i] * 0.9 - 0.001 * (i as f64 % 2.0),
        });
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let returns = ReturnsMatrix::new(
            (0..8).map(|i| start + Duration::weeks(i)).collect(),
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            values,
        );

        let (w, portfolio) = NestedClusters::new(Some(2), 52.0).optimize(&returns).unwrap();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(((w[0] + w[1]) - 0.5).abs() < 1e-9);
        assert!(((w[2] + w[3]) - 0.5).abs() < 1e-9);
        assert!(w.iter().all(|v| *v >= 0.0));
        assert_eq!(portfolio.returns.len(), 8);
    }

    #[test]
    fn test_default_cluster_count() {
        let nco = NestedClusters::new(None, 52.0);
        assert_eq!(nco.cluster_count(1), 1);
        assert_eq!(nco.cluster_count(4), 2);
        assert_eq!(nco.cluster_count(5), 3);
    }
}
