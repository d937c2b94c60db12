// src/classifier/mod.rs
//
// Classifier adapters and the on-disk model format.
// Models are JSON files tagged by `kind`:
//
//   { "kind": "logistic", "name": "lr_v1", "columns": [...],
//     "coefficients": [...], "intercept": -0.3 }
//
// `columns` is optional; when present the selector rejects a feature table
// whose model columns differ from it.

pub mod linear_svm;
pub mod logistic;

pub use linear_svm::{DecisionProbability, LinearSvmModel};
pub use logistic::{sigmoid, LogisticModel};

use crate::error::PipelineError;
use crate::traits::SharedClassifier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Serialized form of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Logistic {
        name: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    LinearSvm {
        name: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
        /// Margin multiplier of the probability proxy
        #[serde(default = "default_margin_scale")]
        margin_scale: f64,
    },
}

fn default_margin_scale() -> f64 {
    1.0
}

impl ModelSpec {
    pub fn name(&self) -> &str {
        match self {
            ModelSpec::Logistic { name, .. } | ModelSpec::LinearSvm { name, .. } => name,
        }
    }

    pub fn columns(&self) -> Option<&[String]> {
        match self {
            ModelSpec::Logistic { columns, .. } | ModelSpec::LinearSvm { columns, .. } => {
                columns.as_deref()
            }
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let (coefficients, columns) = match self {
            ModelSpec::Logistic { coefficients, columns, .. }
            | ModelSpec::LinearSvm { coefficients, columns, .. } => (coefficients, columns),
        };
        if coefficients.is_empty() {
            return Err(PipelineError::Classifier(format!("{} has no coefficients", self.name())));
        }
        if let Some(cols) = columns {
            if cols.len() != coefficients.len() {
                return Err(PipelineError::Classifier(format!(
                    "{} lists {} columns but has {} coefficients",
                    self.name(),
                    cols.len(),
                    coefficients.len()
                )));
            }
        }
        Ok(())
    }

    /// Builds the uniform classifier for this model.
    pub fn into_classifier(self) -> Result<SharedClassifier, PipelineError> {
        self.validate()?;
        Ok(match self {
            ModelSpec::Logistic {
                name,
                columns,
                coefficients,
                intercept,
            } => {
                let model = LogisticModel::new(name, coefficients, intercept);
                Arc::new(match columns {
                    Some(cols) => model.with_columns(cols),
                    None => model,
                })
            }
            ModelSpec::LinearSvm {
                name,
                columns,
                coefficients,
                intercept,
                margin_scale,
            } => {
                let model = LinearSvmModel::new(name, coefficients, intercept);
                let model = match columns {
                    Some(cols) => model.with_columns(cols),
                    None => model,
                };
                Arc::new(DecisionProbability::with_scale(model, margin_scale))
            }
        })
    }
}

/// Reads a model file.
pub fn load_model_spec<P: AsRef<Path>>(path: P) -> Result<ModelSpec, PipelineError> {
    let contents = std::fs::read_to_string(path)?;
    let spec: ModelSpec = serde_json::from_str(&contents)?;
    spec.validate()?;
    Ok(spec)
}
