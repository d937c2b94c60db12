// src/classifier/logistic.rs

use crate::error::PipelineError;
use crate::traits::Classifier;
use ndarray::{Array1, Array2};

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Checks the input width against the trained coefficient count.
pub(crate) fn check_width(model: &str, features: &Array2<f64>, expected: usize) -> Result<(), PipelineError> {
    if features.ncols() != expected {
        return Err(PipelineError::Classifier(format!(
            "{} expects {} feature columns, got {}",
            model,
            expected,
            features.ncols()
        )));
    }
    Ok(())
}

/// Linear score -> sigmoid. The model carries native probabilities.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    name: String,
    columns: Option<Vec<String>>,
    weights: Array1<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn new(name: impl Into<String>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            name: name.into(),
            columns: None,
            weights: Array1::from(coefficients),
            intercept,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn predict_score(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
        check_width(&self.name, features, self.weights.len())?;
        let z = features.dot(&self.weights) + self.intercept;
        Ok(z.mapv(sigmoid).to_vec())
    }
}
