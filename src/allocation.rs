// src/allocation.rs
//
// Allocation normalizer: continuous weights + last prices + capital in,
// whole-share positions out.
//
// Pass 1 drops every instrument whose tentative share count truncates to 0.
// Pass 2 renormalizes the survivors' weights to sum to 1 and recomputes
// shares. If renormalization itself leaves a survivor at 0 shares, that
// instrument is dropped and pass 2 runs again, so every emitted position holds
// at least one share.

use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Absorbs floating error in capital * weight / price before truncation.
pub const SHARE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocatedPosition {
    pub instrument: String,
    pub price: f64,
    /// Renormalized weight
    pub weight: f64,
    pub shares: u64,
    pub allocated_capital: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    /// Sorted by descending weight
    pub positions: Vec<AllocatedPosition>,
    pub requested_capital: f64,
    /// Sum of allocated capital
    pub total_capital: f64,
    pub leftover_capital: f64,
}

impl Allocation {
    fn empty(capital: f64) -> Self {
        Self {
            positions: Vec::new(),
            requested_capital: capital,
            total_capital: 0.0,
            leftover_capital: capital,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The renormalized weights of the positions.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|p| (p.instrument.clone(), p.weight))
            .collect()
    }

    pub fn shares(&self) -> BTreeMap<String, u64> {
        self.positions
            .iter()
            .map(|p| (p.instrument.clone(), p.shares))
            .collect()
    }
}

/// Whole shares affordable with `capital * weight` at `price`.
pub fn whole_shares(capital: f64, weight: f64, price: f64) -> u64 {
    let raw = capital * weight / price;
    if raw.is_finite() && raw > 0.0 {
        (raw + SHARE_EPSILON).floor() as u64
    } else {
        0
    }
}

/// Converts weights into an integer-share allocation under `capital`.
///
/// Instruments without a usable last price are skipped. An allocation where
/// every instrument is dropped is empty with the full capital left over.
///
/// Renormalization repeats until a fixed point where every survivor holds at
/// least one share; with no such drops this is exactly two passes.
pub fn normalize_weights(
    weights: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
    capital: f64,
) -> Allocation {
    if !(capital.is_finite() && capital > 0.0) {
        warn!("Capital {} cannot buy anything", capital);
        return Allocation::empty(capital);
    }

    let mut survivors: Vec<(&str, f64, f64)> = Vec::with_capacity(weights.len());
    for (instrument, &weight) in weights {
        match prices.get(instrument) {
            Some(&price) if price.is_finite() && price > 0.0 => {
                if weight.is_finite() && weight > 0.0 {
                    survivors.push((instrument.as_str(), weight, price));
                }
            }
            _ => warn!("No usable last price for {}, skipped", instrument),
        }
    }

    // Pass 1: tentative shares on the original weights
    survivors.retain(|(instrument, weight, price)| {
        let keep = whole_shares(capital, *weight, *price) > 0;
        if !keep {
            debug!("{} rounds to 0 shares at capital {}, dropped", instrument, capital);
        }
        keep
    });

    // Pass 2: renormalize over survivors
    let positions = loop {
        let total: f64 = survivors.iter().map(|(_, w, _)| w).sum();
        if survivors.is_empty() || total <= 0.0 {
            break Vec::new();
        }

        let candidate: Vec<AllocatedPosition> = survivors
            .iter()
            .map(|(instrument, weight, price)| {
                let weight = weight / total;
                let shares = whole_shares(capital, weight, *price);
                AllocatedPosition {
                    instrument: instrument.to_string(),
                    price: *price,
                    weight,
                    shares,
                    allocated_capital: shares as f64 * price,
                }
            })
            .collect();

        if candidate.iter().all(|p| p.shares > 0) {
            break candidate;
        }
        survivors.retain(|(instrument, _, _)| {
            candidate
                .iter()
                .any(|p| p.instrument == *instrument && p.shares > 0)
        });
    };

    let mut positions = positions;
    positions.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.instrument.cmp(&b.instrument))
    });

    let total_capital: f64 = positions.iter().map(|p| p.allocated_capital).sum();
    Allocation {
        positions,
        requested_capital: capital,
        total_capital,
        leftover_capital: capital - total_capital,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_no_drops() {
        let a = normalize_weights(
            &map(&[("A", 0.6), ("B", 0.4)]),
            &map(&[("A", 100.0), ("B", 50.0)]),
            1000.0,
        );
        assert_eq!(a.positions.len(), 2);
        assert_eq!(a.positions[0].instrument, "A");
        assert_eq!(a.positions[0].shares, 6);
        assert_eq!(a.positions[0].allocated_capital, 600.0);
        assert_eq!(a.positions[1].shares, 8);
        assert_eq!(a.positions[1].allocated_capital, 400.0);
        assert!((a.positions[0].weight - 0.6).abs() < 1e-12);
        assert!(a.leftover_capital.abs() < 1e-9);
    }

    #[test]
    fn test_infeasible_instrument_dropped_and_renormalized() {
        let a = normalize_weights(
            &map(&[("A", 0.05), ("B", 0.95)]),
            &map(&[("A", 1000.0), ("B", 10.0)]),
            100.0,
        );
        assert_eq!(a.positions.len(), 1);
        assert_eq!(a.positions[0].instrument, "B");
        assert_eq!(a.positions[0].weight, 1.0);
        assert_eq!(a.positions[0].shares, 10);
        assert_eq!(a.leftover_capital, 0.0);
    }

    #[test]
    fn test_everything_dropped_is_empty_not_error() {
        let a = normalize_weights(
            &map(&[("A", 0.5), ("B", 0.5)]),
            &map(&[("A", 1000.0), ("B", 2000.0)]),
            100.0,
        );
        assert!(a.is_empty());
        assert_eq!(a.leftover_capital, 100.0);
        assert_eq!(a.total_capital, 0.0);
    }

    #[test]
    fn test_renormalization_repeats_until_every_survivor_holds_a_share() {
        // unnormalized input: both survive pass 1, A falls to 0 shares once
        // weights are renormalized, B is then renormalized alone
        let a = normalize_weights(
            &map(&[("A", 1.0), ("B", 1.5)]),
            &map(&[("A", 60.0), ("B", 60.0)]),
            100.0,
        );
        assert_eq!(a.positions.len(), 1);
        assert_eq!(a.positions[0].instrument, "B");
        assert_eq!(a.positions[0].weight, 1.0);
        assert_eq!(a.positions[0].shares, 1);
        assert_eq!(a.leftover_capital, 40.0);
    }

    #[test]
    fn test_missing_price_skipped() {
        let a = normalize_weights(&map(&[("A", 0.5), ("B", 0.5)]), &map(&[("A", 10.0)]), 100.0);
        assert_eq!(a.positions.len(), 1);
        assert_eq!(a.positions[0].shares, 10);
    }

    #[test]
    fn test_budget_and_weight_sum_hold() {
        // deterministic pseudo-random grid
        let mut seed: u64 = 42;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..200 {
            let n = 1 + (next() * 8.0) as usize;
            let names: Vec<String> = (0..n).map(|i| format!("S{}", i)).collect();
            let weights: BTreeMap<String, f64> = names.iter().map(|s| (s.clone(), next())).collect();
            let prices: BTreeMap<String, f64> =
                names.iter().map(|s| (s.clone(), 1.0 + next() * 500.0)).collect();
            let capital = 50.0 + next() * 5000.0;

            let a = normalize_weights(&weights, &prices, capital);
            assert!(a.total_capital <= capital + 1e-6);
            assert!((a.leftover_capital - (capital - a.total_capital)).abs() < 1e-9);
            if !a.is_empty() {
                let sum: f64 = a.positions.iter().map(|p| p.weight).sum();
                assert!((sum - 1.0).abs() < 1e-9);
                assert!(a.positions.iter().all(|p| p.shares > 0));
                assert!(a.positions.windows(2).all(|w| w[0].weight >= w[1].weight));
            }

            // re-running on the implied weights gives the same shares
            let again = normalize_weights(&a.weights(), &prices, capital);
            assert_eq!(again.shares(), a.shares());
        }
    }
}
