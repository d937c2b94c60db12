// src/optimizer/portfolio.rs
//
// In-sample portfolio produced by a risk function: per-period returns of the
// weighted holdings, compounded cumulative returns and summary statistics.

use super::returns::ReturnsMatrix;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary statistics of a portfolio return series.
///
/// Ratios use a zero risk-free rate and are 0 when their denominator is 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub mean: f64,
    pub annualized_mean: f64,
    pub std: f64,
    pub annualized_std: f64,
    pub sharpe: f64,
    pub annualized_sharpe: f64,
    /// Annualized mean over annualized downside deviation
    pub sortino: f64,
    /// Largest peak-to-trough loss of compounded wealth (positive fraction)
    pub max_drawdown: f64,
    /// Mean return of the worst 5% of periods
    pub cvar_95: f64,
    pub observations: usize,
}

impl PortfolioSummary {
    /// Flat name -> value map for records and JSON output.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            ("mean", self.mean),
            ("annualized_mean", self.annualized_mean),
            ("std", self.std),
            ("annualized_std", self.annualized_std),
            ("sharpe", self.sharpe),
            ("annualized_sharpe", self.annualized_sharpe),
            ("sortino", self.sortino),
            ("max_drawdown", self.max_drawdown),
            ("cvar_95", self.cvar_95),
            ("observations", self.observations as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den > 0.0 && num.is_finite() {
        num / den
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub dates: Vec<NaiveDate>,
    /// Per-period portfolio returns
    pub returns: Vec<f64>,
    /// Periods per year
    pub annualization_factor: f64,
}

impl Portfolio {
    pub fn new(dates: Vec<NaiveDate>, returns: Vec<f64>, annualization_factor: f64) -> Self {
        Self {
            dates,
            returns,
            annualization_factor,
        }
    }

    /// Weighted portfolio over a complete returns matrix.
    pub fn from_weights(returns: &ReturnsMatrix, weights: &[f64], annualization_factor: f64) -> Self {
        let series = returns
            .values
            .rows()
            .into_iter()
            .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum::<f64>())
            .collect();
        Self::new(returns.dates.clone(), series, annualization_factor)
    }

    /// Compounded cumulative return at each date: prod(1 + r) - 1.
    pub fn cumulative_returns(&self) -> Vec<(NaiveDate, f64)> {
        let mut wealth = 1.0;
        self.dates
            .iter()
            .zip(&self.returns)
            .map(|(d, r)| {
                wealth *= 1.0 + r;
                (*d, wealth - 1.0)
            })
            .collect()
    }

    /// Drawdown from the running peak of compounded wealth (<= 0).
    pub fn drawdowns(&self) -> Vec<(NaiveDate, f64)> {
        let mut wealth = 1.0;
        let mut peak: f64 = 1.0;
        self.dates
            .iter()
            .zip(&self.returns)
            .map(|(d, r)| {
                wealth *= 1.0 + r;
                peak = peak.max(wealth);
                (*d, wealth / peak - 1.0)
            })
            .collect()
    }

    pub fn summary(&self) -> PortfolioSummary {
        let n = self.returns.len();
        if n == 0 {
            return PortfolioSummary::default();
        }
        let f = self.annualization_factor;
        let nf = n as f64;

        let mean = self.returns.iter().sum::<f64>() / nf;
        let std = if n > 1 {
            (self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (nf - 1.0)).sqrt()
        } else {
            0.0
        };
        let downside =
            (self.returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / nf).sqrt();

        let mut sorted = self.returns.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let tail = ((nf * 0.05).ceil() as usize).max(1);
        let cvar_95 = sorted[..tail].iter().sum::<f64>() / tail as f64;

        let max_drawdown = self
            .drawdowns()
            .iter()
            .map(|(_, dd)| -dd)
            .fold(0.0, f64::max);

        let sharpe = ratio_or_zero(mean, std);
        PortfolioSummary {
            mean,
            annualized_mean: mean * f,
            std,
            annualized_std: std * f.sqrt(),
            sharpe,
            annualized_sharpe: sharpe * f.sqrt(),
            sortino: ratio_or_zero(mean * f, downside * f.sqrt()),
            max_drawdown,
            cvar_95,
            observations: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ndarray::array;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        (0..n).map(|i| start + Duration::weeks(i as i64)).collect()
    }

    #[test]
    fn test_from_weights() {
        let r = ReturnsMatrix::new(
            dates(2),
            vec!["A".to_string(), "B".to_string()],
            array![[0.10, 0.00], [-0.10, 0.20]],
        );
        let p = Portfolio::from_weights(&r, &[0.5, 0.5], 52.0);
        assert!((p.returns[0] - 0.05).abs() < 1e-12);
        assert!((p.returns[1] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_returns_compound() {
        let p = Portfolio::new(dates(2), vec![0.10, 0.10], 52.0);
        let cum = p.cumulative_returns();
        assert!((cum[1].1 - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_and_summary() {
        let p = Portfolio::new(dates(4), vec![0.10, -0.50, 0.20, 0.10], 52.0);
        let dd = p.drawdowns();
        assert_eq!(dd[0].1, 0.0);
        assert!((dd[1].1 + 0.5).abs() < 1e-12);

        let s = p.summary();
        assert_eq!(s.observations, 4);
        assert!((s.max_drawdown - 0.5).abs() < 1e-12);
        assert!((s.cvar_95 + 0.5).abs() < 1e-12);
        assert!((s.annualized_mean - s.mean * 52.0).abs() < 1e-12);
        assert!(s.std > 0.0);
        assert_eq!(s.to_map()["observations"], 4.0);
    }

    #[test]
    fn test_flat_series_has_zero_ratios() {
        let p = Portfolio::new(dates(3), vec![0.0, 0.0, 0.0], 52.0);
        let s = p.summary();
        assert_eq!(s.sharpe, 0.0);
        assert_eq!(s.sortino, 0.0);
    }
}
