// src/classifier/linear_svm.rs
//
// Margin-only models and the adapter that turns a margin into a probability
// proxy, so the selector never needs to know which kind it holds.

use super::logistic::{check_width, sigmoid};
use crate::error::PipelineError;
use crate::traits::{Classifier, DecisionFunction};
use ndarray::{Array1, Array2};

/// Linear support vector machine: signed distance to the separating hyperplane.
#[derive(Debug, Clone)]
pub struct LinearSvmModel {
    name: String,
    columns: Option<Vec<String>>,
    weights: Array1<f64>,
    intercept: f64,
}

impl LinearSvmModel {
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

impl DecisionFunction for LinearSvmModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn decision_function(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
        check_width(&self.name, features, self.weights.len())?;
        Ok((features.dot(&self.weights) + self.intercept).to_vec())
    }
}

/// Probability proxy for a decision function: sigmoid(scale * margin).
///
/// Monotone in the margin, 0.5 on the decision boundary.
#[derive(Debug, Clone)]
pub struct DecisionProbability<D> {
    inner: D,
    scale: f64,
}

impl<D: DecisionFunction> DecisionProbability<D> {
    pub fn with_scale(inner: D, scale: f64) -> Self {
        Self { inner, scale }
    }
}

impl<D: DecisionFunction> Classifier for DecisionProbability<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn columns(&self) -> Option<&[String]> {
        self.inner.columns()
    }

    fn predict_score(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
        let margins = self.inner.decision_function(features)?;
        Ok(margins.into_iter().map(|m| sigmoid(self.scale * m)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_decision_function() {
        let svm = LinearSvmModel::new("svm", vec![2.0], -1.0);
        let margins = svm.decision_function(&array![[0.5], [1.0]]).unwrap();
        assert_eq!(margins, vec![0.0, 1.0]);
    }

    #[test]
    fn test_probability_proxy_is_monotone() {
        let clf = DecisionProbability::with_scale(LinearSvmModel::new("svm", vec![1.0], 0.0), 2.0);
        let p = clf.predict_score(&array![[-1.0], [0.0], [0.5], [3.0]]).unwrap();
        assert_eq!(p[1], 0.5);
        assert!(p.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(clf.name(), "svm");
    }
}
