// src/optimizer/adapter.rs
//
// Risk optimizer adapter: price table + instrument set in, weights and
// portfolio out. The adapter builds the returns matrix and delegates to
// whichever risk function it is given; failures pass through unchanged.

use super::portfolio::Portfolio;
use super::returns::PriceMatrix;
use crate::error::PipelineError;
use crate::models::PriceTable;
use crate::traits::RiskOptimizer;
use chrono::NaiveDate;
use log::info;
use std::collections::BTreeMap;

/// Continuous weights from a risk function.
#[derive(Debug, Clone)]
pub struct OptimizedWeights {
    pub method: String,
    /// Instruments in matrix column order
    pub instruments: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub portfolio: Portfolio,
}

/// Optimizes `instruments` over prices dated on or before `cutoff`.
pub fn optimize_portfolio(
    prices: &PriceTable,
    instruments: &[String],
    cutoff: Option<NaiveDate>,
    optimizer: &dyn RiskOptimizer,
) -> Result<OptimizedWeights, PipelineError> {
    let matrix = PriceMatrix::build(prices, instruments, cutoff);
    if matrix.instruments.is_empty() {
        return Err(PipelineError::DataGap(format!(
            "none of {} instruments has price history",
            instruments.len()
        )));
    }

    let returns = matrix.returns();
    let (weights, portfolio) = optimizer.optimize(&returns)?;

    if weights.len() != matrix.instruments.len() {
        return Err(PipelineError::optimization(
            optimizer.name(),
            format!(
                "returned {} weights for {} instruments",
                weights.len(),
                matrix.instruments.len()
            ),
        ));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(PipelineError::optimization(optimizer.name(), "non-finite weights"));
    }

    info!(
        "{} optimized {} instruments over {} return periods",
        optimizer.name(),
        matrix.instruments.len(),
        portfolio.returns.len()
    );

    Ok(OptimizedWeights {
        method: optimizer.name().to_string(),
        weights: matrix
            .instruments
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect(),
        instruments: matrix.instruments,
        portfolio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use crate::optimizer::{EqualWeighted, ReturnsMatrix};
    use chrono::Duration;

    struct NanWeights;

    impl RiskOptimizer for NanWeights {
        fn name(&self) -> &str {
            "nan"
        }

        fn optimize(&self, returns: &ReturnsMatrix) -> Result<(Vec<f64>, Portfolio), PipelineError> {
            Ok((
                vec![f64::NAN; returns.n_instruments()],
                Portfolio::new(vec![], vec![], 52.0),
            ))
        }
    }

    fn prices() -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mut points = Vec::new();
        for w in 0..6 {
            for (name, base) in [("A", 10.0), ("B", 20.0)] {
                points.push(PricePoint {
                    instrument: name.to_string(),
                    date: start + Duration::weeks(w),
                    price: base + w as f64 * if name == "A" { 0.5 } else { -0.3 },
                });
            }
        }
        PriceTable::new(points)
    }

    #[test]
    fn test_weights_keyed_by_instrument() {
        let names = vec!["B".to_string(), "A".to_string(), "MISSING".to_string()];
        let result = optimize_portfolio(&prices(), &names, None, &EqualWeighted::new(52.0)).unwrap();
        assert_eq!(result.instruments, vec!["B", "A"]);
        assert_eq!(result.weights["A"], 0.5);
        assert_eq!(result.portfolio.returns.len(), 5);
    }

    #[test]
    fn test_cutoff_limits_history() {
        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let names = vec!["A".to_string(), "B".to_string()];
        let result = optimize_portfolio(&prices(), &names, Some(cutoff), &EqualWeighted::new(52.0)).unwrap();
        assert_eq!(result.portfolio.returns.len(), 2);
    }

    #[test]
    fn test_non_finite_weights_rejected() {
        let names = vec!["A".to_string()];
        let err = optimize_portfolio(&prices(), &names, None, &NanWeights).unwrap_err();
        assert!(matches!(err, PipelineError::Optimization { .. }));
    }

    #[test]
    fn test_no_prices_is_data_gap() {
        let names = vec!["ZZZ".to_string()];
        let err = optimize_portfolio(&prices(), &names, None, &EqualWeighted::new(52.0)).unwrap_err();
        assert!(matches!(err, PipelineError::DataGap(_)));
    }
}
