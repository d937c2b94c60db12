// src/traits.rs

use crate::error::PipelineError;
use crate::optimizer::{Portfolio, ReturnsMatrix};
use crate::store::Snapshot;
use async_trait::async_trait;
use ndarray::Array2;
use std::sync::Arc;

/// A trained classifier that scores feature rows.
///
/// Input columns must follow the order used at training time
/// (`FeatureTable::model_columns`). Output is one probability of
/// outperformance per input row.
pub trait Classifier: Send + Sync {
    /// Returns the name of this model (for logging).
    fn name(&self) -> &str;

    /// Training-time input columns, when the model recorded them.
    fn columns(&self) -> Option<&[String]> {
        None
    }

    fn predict_score(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError>;
}

/// Models that only expose a raw decision value (margin) per row.
/// Wrap them in `classifier::DecisionProbability` to use them as a `Classifier`.
pub trait DecisionFunction: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self) -> Option<&[String]> {
        None
    }

    fn decision_function(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError>;
}

/// A pluggable risk-optimization method.
///
/// Receives a date x instrument returns matrix and returns a weight vector
/// aligned with `returns.instruments` plus the resulting portfolio.
/// Degenerate input must fail with `PipelineError::Optimization`.
pub trait RiskOptimizer: Send + Sync {
    fn name(&self) -> &str;

    fn optimize(&self, returns: &ReturnsMatrix) -> Result<(Vec<f64>, Portfolio), PipelineError>;
}

/// Builds a complete data snapshot (price table, feature table, metadata).
pub trait SnapshotLoader: Send + Sync {
    fn load(&self) -> Result<Snapshot, PipelineError>;
}

/// Refresh behaviour shared by data stores.
///
/// Uses `&self` with interior mutability so a store can be shared via `Arc`.
#[async_trait]
pub trait Refreshable: Send + Sync {
    /// Rebuilds the data and swaps it in. Returns the number of rows loaded.
    async fn refresh(&self) -> Result<usize, PipelineError>;

    /// Returns the Unix timestamp of the last successful refresh.
    fn last_updated(&self) -> i64;
}

pub type SharedClassifier = Arc<dyn Classifier>;
pub type SharedRiskOptimizer = Arc<dyn RiskOptimizer>;
pub type SharedRefreshable = Arc<dyn Refreshable>;
