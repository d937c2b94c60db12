// src/error.rs
//
// Error taxonomy for the selection / optimization / allocation pipeline.
// "No good picks" and "the math failed" are separate variants so callers can
// tell them apart.

use thiserror::Error;

/// Errors produced by the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Not enough history to compute a required return series or feature.
    #[error("Insufficient data: {0}")]
    DataGap(String),

    /// No instrument cleared the selection threshold.
    #[error("No instruments selected: none of {candidates} candidates scored above {threshold}")]
    EmptySelection { threshold: f64, candidates: usize },

    /// The risk function rejected its input (singular or degenerate covariance, etc).
    #[error("Optimization failed ({method}): {reason}")]
    Optimization { method: String, reason: String },

    /// The classifier could not score the feature matrix.
    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown risk model: {0}")]
    UnknownRiskModel(String),

    #[error("Data snapshot has not been loaded")]
    SnapshotNotLoaded,

    #[error("Configuration error: {0}")]
    Config(String),

    /// A data file holds a value that cannot be read (bad date, bad number).
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Shorthand for an optimizer failure.
    pub fn optimization(method: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Optimization {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// True when the failure means "the model picked nothing" rather than a
    /// downstream failure.
    pub fn is_empty_selection(&self) -> bool {
        matches!(self, PipelineError::EmptySelection { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_is_distinct() {
        let empty = PipelineError::EmptySelection {
            threshold: 0.6,
            candidates: 3,
        };
        let failed = PipelineError::optimization("mean_variance", "singular covariance");
        assert!(empty.is_empty_selection());
        assert!(!failed.is_empty_selection());
        assert!(failed.to_string().contains("mean_variance"));
    }
}
