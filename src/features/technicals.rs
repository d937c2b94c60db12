// src/features/technicals.rs
//
// Per-instrument technical block computed from weekly bars and the weekly
// benchmark series. Each value at row t only reads rows <= t.

use super::indicators::{
    bollinger_bands, linreg_slope, momentum, pct_change, ratio, rolling_corr, rolling_cov,
    rolling_std, rolling_var, rolling_zscore, rsi, safe_ln, sma, trailing_return,
};
use super::merge::asof_position;
use crate::config::FeatureConfig;
use crate::models::PriceBar;
use chrono::NaiveDate;

/// Technical features of one weekly row.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalRow {
    pub date: NaiveDate,
    pub close_raw: f64,
    /// Benchmark close as of `date` (NaN when the benchmark has no history yet)
    pub close_benchmark: f64,
    /// Aligned with `technical_columns`
    pub values: Vec<f64>,
}

/// Names of the technical columns, in output order.
pub fn technical_columns(config: &FeatureConfig) -> Vec<String> {
    let s = config.short_window;
    let l = config.long_window;
    let t = config.trend_window;
    vec![
        "close".to_string(),
        "volume".to_string(),
        "bb_pr_up".to_string(),
        "bb_pr_dn".to_string(),
        format!("rsi_{}w", s),
        format!("mom_{}w", s),
        format!("mom_{}w", l),
        format!("lr_slope_{}w", s),
        format!("ma_pr_{}w", l),
        format!("ma_pr_{}w", t),
        format!("ret_{}w", s),
        format!("ret_{}w", l),
        format!("vol_{}w", s),
        format!("ret_div_vol_{}w", s),
        format!("beta_{}w", s),
        format!("beta_{}w", l),
        format!("corr_rtn_bench_{}w", s),
        format!("excess_{}w", s),
        format!("excess_{}w", l),
        format!("corr_rtn_volume_{}w", s),
    ]
}

/// Attaches to each bar date the latest benchmark close dated on or before it.
fn align_benchmark(bars: &[PriceBar], benchmark: &[PriceBar]) -> Vec<f64> {
    let dates: Vec<NaiveDate> = benchmark.iter().map(|b| b.date).collect();
    bars.iter()
        .map(|bar| {
            asof_position(&dates, bar.date)
                .map(|i| benchmark[i].close)
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Computes the technical block for one instrument.
///
/// `bars` and `benchmark` must be weekly and sorted by date. An empty `bars`
/// yields no rows; a short benchmark yields NaN beta/correlation/excess values.
pub fn compute_technicals(
    bars: &[PriceBar],
    benchmark: &[PriceBar],
    config: &FeatureConfig,
) -> Vec<TechnicalRow> {
    if bars.is_empty() {
        return Vec::new();
    }

    let s = config.short_window;
    let l = config.long_window;
    let t = config.trend_window;

    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let bench_close = align_benchmark(bars, benchmark);

    // Bollinger bands
    let (upper, _, lower) = bollinger_bands(&close, s, config.band_width);
    let bb_pr_up: Vec<f64> = ratio(&close, &upper).into_iter().map(safe_ln).collect();
    let bb_pr_dn: Vec<f64> = ratio(&close, &lower).into_iter().map(safe_ln).collect();

    let rsi_s: Vec<f64> = rsi(&close, s).into_iter().map(|v| v / 100.0).collect();
    let mom_s = momentum(&close, s);
    let mom_l = momentum(&close, l);
    let slope_s = linreg_slope(&close, s);

    let ma_pr_l: Vec<f64> = ratio(&close, &sma(&close, l)).into_iter().map(safe_ln).collect();
    let ma_pr_t: Vec<f64> = ratio(&close, &sma(&close, t)).into_iter().map(safe_ln).collect();

    let ret_s = trailing_return(&close, s);
    let ret_l = trailing_return(&close, l);

    let stock_ret = pct_change(&close);
    let vol_s = rolling_std(&stock_ret, s, 1);
    let ret_div_vol = ratio(&ret_s, &vol_s);

    // Benchmark-relative block
    let bench_ret = pct_change(&bench_close);
    let beta_s = ratio(&rolling_cov(&stock_ret, &bench_ret, s), &rolling_var(&bench_ret, s));
    let beta_l = ratio(&rolling_cov(&stock_ret, &bench_ret, l), &rolling_var(&bench_ret, l));
    let corr_bench = rolling_corr(&stock_ret, &bench_ret, s);
    let bench_ret_s = trailing_return(&bench_close, s);
    let bench_ret_l = trailing_return(&bench_close, l);
    let excess_s: Vec<f64> = ret_s.iter().zip(&bench_ret_s).map(|(a, b)| a - b).collect();
    let excess_l: Vec<f64> = ret_l.iter().zip(&bench_ret_l).map(|(a, b)| a - b).collect();

    let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let corr_volume = rolling_corr(&stock_ret, &volume, s);

    // Scaling: log price, volume as trailing z-score of log(1 + v)
    let log_close: Vec<f64> = close.iter().map(|c| safe_ln(*c)).collect();
    let log_volume: Vec<f64> = volume.iter().map(|v| (v.max(0.0) + 1.0).ln()).collect();
    let volume_z = rolling_zscore(&log_volume, config.volume_window);

    let columns: Vec<&Vec<f64>> = vec![
        &log_close, &volume_z, &bb_pr_up, &bb_pr_dn, &rsi_s, &mom_s, &mom_l, &slope_s, &ma_pr_l,
        &ma_pr_t, &ret_s, &ret_l, &vol_s, &ret_div_vol, &beta_s, &beta_l, &corr_bench, &excess_s,
        &excess_l, &corr_volume,
    ];

    bars.iter()
        .enumerate()
        .map(|(i, bar)| TechnicalRow {
            date: bar.date,
            close_raw: bar.close,
            close_benchmark: bench_close[i],
            values: columns.iter().map(|c| c[i]).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn weekly(instrument: &str, closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                PriceBar::from_close(instrument, start + Duration::weeks(i as i64), *c, 1000.0 + i as f64 * 10.0)
            })
            .collect()
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            short_window: 3,
            long_window: 5,
            trend_window: 6,
            volume_window: 4,
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_columns_match_values() {
        let config = small_config();
        let closes: Vec<f64> = (0..12).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let bench: Vec<f64> = (0..12).map(|i| 300.0 + (i as f64).cos() * 7.0).collect();
        let rows = compute_technicals(&weekly("AAA", &closes), &weekly("SPY", &bench), &config);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].values.len(), technical_columns(&config).len());
        // leading rows are missing, the last row is fully populated
        assert!(rows[0].values.iter().any(|v| v.is_nan()));
        assert!(rows[11].values.iter().all(|v| v.is_finite()), "{:?}", rows[11].values);
    }

    #[test]
    fn test_no_look_ahead() {
        // Changing a future price must not change any earlier row.
        let config = small_config();
        let closes: Vec<f64> = (0..12).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let bench: Vec<f64> = (0..12).map(|i| 300.0 + (i as f64).cos() * 7.0).collect();
        let mut shocked = closes.clone();
        shocked[11] *= 3.0;

        let base = compute_technicals(&weekly("AAA", &closes), &weekly("SPY", &bench), &config);
        let after = compute_technicals(&weekly("AAA", &shocked), &weekly("SPY", &bench), &config);
        for i in 0..11 {
            for (a, b) in base[i].values.iter().zip(&after[i].values) {
                assert!((a.is_nan() && b.is_nan()) || a == b);
            }
        }
    }

    #[test]
    fn test_missing_benchmark_propagates() {
        let config = small_config();
        let closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
        let rows = compute_technicals(&weekly("AAA", &closes), &[], &config);
        let names = technical_columns(&config);
        let beta_idx = names.iter().position(|n| n == "beta_3w").unwrap();
        assert!(rows.iter().all(|r| r.values[beta_idx].is_nan()));
        assert!(rows.iter().all(|r| r.close_benchmark.is_nan()));
    }

    #[test]
    fn test_empty_instrument_yields_nothing() {
        assert!(compute_technicals(&[], &[], &FeatureConfig::default()).is_empty());
    }
}
