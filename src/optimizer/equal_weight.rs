// src/optimizer/equal_weight.rs

use super::min_variance::usable_rows;
use super::portfolio::Portfolio;
use super::returns::ReturnsMatrix;
use crate::error::PipelineError;
use crate::traits::RiskOptimizer;

/// 1/n in every instrument. Needs at least one gap-free date for its
/// portfolio statistics.
#[derive(Debug, Clone)]
pub struct EqualWeighted {
    annualization_factor: f64,
}

impl EqualWeighted {
    pub fn new(annualization_factor: f64) -> Self {
        Self { annualization_factor }
    }
}

impl RiskOptimizer for EqualWeighted {
    fn name(&self) -> &str {
        "equal"
    }

    fn optimize(&self, returns: &ReturnsMatrix) -> Result<(Vec<f64>, Portfolio), PipelineError> {
        let complete = usable_rows(self.name(), returns)?;
        let n = complete.n_instruments();
        let weights = vec![1.0 / n as f64; n];
        let portfolio = Portfolio::from_weights(&complete, &weights, self.annualization_factor);
        Ok((weights, portfolio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    #[test]
    fn test_equal_weights() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let r = ReturnsMatrix::new(
            vec![d],
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            array![[0.04, 0.0, -0.02, 0.02]],
        );
        let (w, p) = EqualWeighted::new(52.0).optimize(&r).unwrap();
        assert_eq!(w, vec![0.25; 4]);
        assert!((p.returns[0] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_no_instruments_is_data_gap() {
        let r = ReturnsMatrix::new(vec![], vec![], ndarray::Array2::zeros((0, 0)));
        assert!(matches!(
            EqualWeighted::new(52.0).optimize(&r),
            Err(PipelineError::DataGap(_))
        ));
    }
}
