// src/rebalance.rs
//
// Rebalancing re-optimizes the risk weights of a fixed holding set as of a
// new date and capital. Nothing is re-selected.

use crate::allocation::{normalize_weights, Allocation};
use crate::error::PipelineError;
use crate::models::{PortfolioRecord, PriceTable};
use crate::optimizer::{optimize_portfolio, PortfolioSummary};
use crate::traits::RiskOptimizer;
use chrono::{NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRequest {
    /// Price history is restricted to dates on or before this one
    pub as_of: NaiveDate,
    /// Defaults to the record's capital
    #[serde(default)]
    pub capital: Option<f64>,
    /// Defaults to the record's risk model
    #[serde(default)]
    pub risk_model: Option<String>,
    /// Live prices overriding the table's last prices
    #[serde(default)]
    pub prices: Option<BTreeMap<String, f64>>,
}

impl RebalanceRequest {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            capital: None,
            risk_model: None,
            prices: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightChange {
    pub instrument: String,
    pub previous: f64,
    pub proposed: f64,
}

impl WeightChange {
    pub fn delta(&self) -> f64 {
        self.proposed - self.previous
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceOutcome {
    /// Continuous weights from the risk function
    pub optimized_weights: BTreeMap<String, f64>,
    pub allocation: Allocation,
    pub summary: PortfolioSummary,
    pub changes: Vec<WeightChange>,
    /// Record describing the rebalanced portfolio
    pub record: PortfolioRecord,
}

/// Per-instrument weight moves over the union of both holding sets.
pub fn weight_changes(
    previous: &BTreeMap<String, f64>,
    proposed: &BTreeMap<String, f64>,
) -> Vec<WeightChange> {
    let instruments: BTreeSet<&String> = previous.keys().chain(proposed.keys()).collect();
    instruments
        .into_iter()
        .map(|instrument| WeightChange {
            instrument: instrument.clone(),
            previous: previous.get(instrument).copied().unwrap_or(0.0),
            proposed: proposed.get(instrument).copied().unwrap_or(0.0),
        })
        .collect()
}

/// Re-runs optimization and allocation for the record's instruments.
pub fn rebalance(
    prices: &PriceTable,
    record: &PortfolioRecord,
    request: &RebalanceRequest,
    optimizer: &dyn RiskOptimizer,
) -> Result<RebalanceOutcome, PipelineError> {
    let instruments = record.instruments();
    if instruments.is_empty() {
        return Err(PipelineError::DataGap("portfolio has no instruments".to_string()));
    }
    let capital = request.capital.unwrap_or(record.capital);

    let optimized = optimize_portfolio(prices, &instruments, Some(request.as_of), optimizer)?;

    let mut last_prices = prices.last_prices(Some(request.as_of));
    if let Some(live) = &request.prices {
        last_prices.extend(live.iter().map(|(k, v)| (k.clone(), *v)));
    }
    let allocation = normalize_weights(&optimized.weights, &last_prices, capital);
    let summary = optimized.portfolio.summary();
    let proposed = allocation.weights();
    let changes = weight_changes(&record.weights, &proposed);

    info!(
        "Rebalanced {} instruments as of {} with {}: {} positions, {:.2} left over",
        instruments.len(),
        request.as_of,
        optimizer.name(),
        allocation.positions.len(),
        allocation.leftover_capital
    );

    let new_record = PortfolioRecord {
        id: None,
        weights: proposed,
        stats: summary.to_map(),
        capital,
        risk_model: optimizer.name().to_string(),
        as_of: request.as_of,
        created_at: Utc::now(),
    };

    Ok(RebalanceOutcome {
        optimized_weights: optimized.weights,
        allocation,
        summary,
        changes,
        record: new_record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use crate::optimizer::{EqualWeighted, MinimumVariance};
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    fn prices() -> PriceTable {
        let mut points = Vec::new();
        for w in 0..10 {
            let date = start() + Duration::weeks(w);
            for (name, base) in [("A", 50.0), ("B", 20.0), ("C", 5.0)] {
                points.push(PricePoint {
                    instrument: name.to_string(),
                    date,
                    price: base * (1.0 + 0.01 * w as f64),
                });
            }
        }
        PriceTable::new(points)
    }

    fn record() -> PortfolioRecord {
        PortfolioRecord {
            id: Some("p1".to_string()),
            weights: [("A".to_string(), 0.7), ("B".to_string(), 0.3)].into_iter().collect(),
            stats: BTreeMap::new(),
            capital: 1000.0,
            risk_model: "equal".to_string(),
            as_of: start(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rebalance_keeps_universe_and_defaults_capital() {
        let as_of = start() + Duration::weeks(5);
        let outcome = rebalance(&prices(), &record(), &RebalanceRequest::new(as_of), &EqualWeighted::new(52.0)).unwrap();

        // C is never re-picked
        assert!(!outcome.optimized_weights.contains_key("C"));
        assert_eq!(outcome.record.capital, 1000.0);
        assert_eq!(outcome.record.as_of, as_of);
        assert_eq!(outcome.summary.observations, 5);
        assert!(outcome.allocation.total_capital <= 1000.0);

        let a = outcome.changes.iter().find(|c| c.instrument == "A").unwrap();
        assert_eq!(a.previous, 0.7);
        assert!((a.proposed - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_capital_override_and_live_prices() {
        let mut request = RebalanceRequest::new(start() + Duration::weeks(9));
        request.capital = Some(100.0);
        request.prices = Some([("A".to_string(), 1000.0)].into_iter().collect());
        let outcome = rebalance(&prices(), &record(), &request, &EqualWeighted::new(52.0)).unwrap();

        // A is unaffordable at the live price and dropped
        assert_eq!(outcome.allocation.positions.len(), 1);
        assert_eq!(outcome.allocation.positions[0].instrument, "B");
        let a = outcome.changes.iter().find(|c| c.instrument == "A").unwrap();
        assert_eq!(a.proposed, 0.0);
        assert!((a.delta() + 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_prices_after_as_of_are_ignored() {
        let as_of = start() + Duration::weeks(5);
        let mut points = Vec::new();
        for w in 0..10i64 {
            let date = start() + Duration::weeks(w);
            for (i, (name, base)) in [("A", 50.0), ("B", 20.0)].iter().enumerate() {
                let wiggle = ((w as f64) * (1.5 + i as f64)).sin() * 0.03;
                // A jumps tenfold once the rebalance date has passed
                let spike = if *name == "A" && date > as_of { 10.0 } else { 1.0 };
                points.push(PricePoint {
                    instrument: name.to_string(),
                    date,
                    price: base * (1.0 + wiggle) * spike,
                });
            }
        }
        let before: Vec<PricePoint> = points.iter().filter(|p| p.date <= as_of).cloned().collect();
        let optimizer = MinimumVariance::ledoit_wolf(52.0);
        let request = RebalanceRequest::new(as_of);

        let spiked = rebalance(&PriceTable::new(points), &record(), &request, &optimizer).unwrap();
        let cut = rebalance(&PriceTable::new(before.clone()), &record(), &request, &optimizer).unwrap();

        assert_eq!(spiked.summary.observations, 5);
        assert_eq!(spiked.summary.observations, cut.summary.observations);
        for (name, w) in &cut.optimized_weights {
            assert!((spiked.optimized_weights[name] - w).abs() < 1e-12);
        }
        assert_eq!(spiked.allocation.shares(), cut.allocation.shares());

        // allocation prices come from the cutoff date, not the spike
        assert!(!spiked.allocation.is_empty());
        for position in &spiked.allocation.positions {
            let at_cutoff = before
                .iter()
                .find(|p| p.instrument == position.instrument && p.date == as_of)
                .unwrap();
            assert_eq!(position.price, at_cutoff.price);
        }
    }

    #[test]
    fn test_weight_changes_cover_union() {
        let before: BTreeMap<String, f64> = [("A".to_string(), 1.0)].into_iter().collect();
        let after: BTreeMap<String, f64> = [("B".to_string(), 1.0)].into_iter().collect();
        let changes = weight_changes(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].previous, 0.0);
    }
}
