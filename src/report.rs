// src/report.rs
//
// Allocation reporting: sector aggregation, equity and drawdown curves and
// the holdings' return correlations.

use crate::error::PipelineError;
use crate::models::{InstrumentMeta, PriceTable};
use crate::optimizer::{correlation, sample_covariance, Portfolio, PriceMatrix};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNKNOWN_SECTOR: &str = "Unknown";

/// One point of an equity or drawdown curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub instruments: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// Total weight per sector. Instruments without a sector count as "Unknown".
pub fn sector_weights(
    weights: &BTreeMap<String, f64>,
    metadata: &HashMap<String, InstrumentMeta>,
) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (instrument, weight) in weights {
        let sector = metadata
            .get(instrument)
            .and_then(|m| m.sector.clone())
            .unwrap_or_else(|| UNKNOWN_SECTOR.to_string());
        *out.entry(sector).or_insert(0.0) += weight;
    }
    out
}

/// Growth of 100 invested in the portfolio.
pub fn equity_curve(portfolio: &Portfolio) -> Vec<CurvePoint> {
    portfolio
        .cumulative_returns()
        .into_iter()
        .map(|(date, cum)| CurvePoint {
            date,
            value: 100.0 * (1.0 + cum),
        })
        .collect()
}

/// Drawdown of an equity curve from its running peak (<= 0).
pub fn drawdown(curve: &[CurvePoint]) -> Vec<CurvePoint> {
    let mut peak = f64::MIN;
    curve
        .iter()
        .map(|p| {
            peak = peak.max(p.value);
            CurvePoint {
                date: p.date,
                value: if peak > 0.0 { p.value / peak - 1.0 } else { 0.0 },
            }
        })
        .collect()
}

/// Applies fixed weights to price returns over `[start, end]` and compounds
/// them: cumprod(1 + r) * 100. Dates where a holding has no return are skipped.
pub fn performance(
    prices: &PriceTable,
    weights: &BTreeMap<String, f64>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<CurvePoint>, PipelineError> {
    let instruments: Vec<String> = weights.keys().cloned().collect();
    let matrix = PriceMatrix::build(prices, &instruments, end);
    if matrix.instruments.is_empty() {
        return Err(PipelineError::DataGap("no prices for any holding".to_string()));
    }
    let returns = matrix.returns().complete_rows();
    let w: Vec<f64> = matrix
        .instruments
        .iter()
        .map(|i| weights.get(i).copied().unwrap_or(0.0))
        .collect();

    let mut value = 100.0;
    let mut curve = Vec::new();
    for (date, row) in returns.dates.iter().zip(returns.values.rows()) {
        if start.map_or(false, |s| *date < s) {
            continue;
        }
        let r: f64 = row.iter().zip(&w).map(|(r, w)| r * w).sum();
        value *= 1.0 + r;
        curve.push(CurvePoint { date: *date, value });
    }
    Ok(curve)
}

/// Pairwise correlation of the holdings' returns on gap-free dates.
pub fn correlation_matrix(
    prices: &PriceTable,
    instruments: &[String],
    cutoff: Option<NaiveDate>,
) -> Result<CorrelationMatrix, PipelineError> {
    let matrix = PriceMatrix::build(prices, instruments, cutoff);
    let returns = matrix.returns().complete_rows();
    let cov = sample_covariance(&returns.values)?;
    let corr = correlation(&cov)?;
    let n = corr.nrows();
    Ok(CorrelationMatrix {
        instruments: returns.instruments,
        values: (0..n).map(|i| (0..n).map(|j| corr[(i, j)]).collect()).collect(),
    })
}
