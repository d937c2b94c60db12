// src/features/fundamentals.rs
//
// Cross-sectional normalization of fundamental metrics.
// For every reporting date the metrics of all instruments reporting that date
// are z-scored together. Per-share dollar metrics get a signed log first and
// ratio metrics are clipped to median +/- k * MAD. Values that end up missing
// are zero-filled and flagged in a companion `<col>_na` column.

use crate::config::FeatureConfig;
use crate::models::FundamentalTable;
use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

/// A normalized fundamental report.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub instrument: String,
    pub date: NaiveDate,
    /// Normalized metrics followed by their missing indicators (0.0 / 1.0)
    pub values: Vec<f64>,
}

/// Output of `normalize_fundamentals`.
#[derive(Debug, Clone, Default)]
pub struct NormalizedFundamentals {
    /// Metric names followed by `<metric>_na` names
    pub columns: Vec<String>,
    /// Number of metric columns (the first half of `columns`)
    pub n_metrics: usize,
    pub records: Vec<NormalizedRecord>,
}

impl NormalizedFundamentals {
    /// Records grouped by instrument, each group sorted by date.
    pub fn by_instrument(&self) -> BTreeMap<&str, Vec<&NormalizedRecord>> {
        let mut grouped: BTreeMap<&str, Vec<&NormalizedRecord>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.instrument.as_str()).or_default().push(record);
        }
        for records in grouped.values_mut() {
            records.sort_by_key(|r| r.date);
        }
        grouped
    }
}

/// sign(x) * ln(1 + |x|)
pub fn signed_log(x: f64) -> f64 {
    x.signum() * x.abs().ln_1p()
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Clips finite values to median +/- k * MAD. A zero MAD leaves values untouched.
pub fn winsorize_mad(values: &mut [f64], k: f64) {
    let mut observed: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if observed.is_empty() {
        return;
    }
    let med = median(&mut observed);
    let mut deviations: Vec<f64> = observed.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&mut deviations);
    if mad <= 0.0 {
        return;
    }
    let (lo, hi) = (med - k * mad, med + k * mad);
    for v in values.iter_mut().filter(|v| v.is_finite()) {
        *v = v.clamp(lo, hi);
    }
}

/// Z-scores finite values with the population deviation.
/// A zero or undefined deviation turns every value into NaN.
pub fn zscore(values: &mut [f64]) {
    let observed: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if observed.is_empty() {
        return;
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let sd = (observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    for v in values.iter_mut() {
        *v = if sd > 0.0 && v.is_finite() {
            (*v - mean) / sd
        } else {
            f64::NAN
        };
    }
}

/// Normalizes a fundamentals table cross-sectionally per reporting date.
pub fn normalize_fundamentals(table: &FundamentalTable, config: &FeatureConfig) -> NormalizedFundamentals {
    let n_metrics = table.columns.len();
    let is_per_share: Vec<bool> = table
        .columns
        .iter()
        .map(|c| config.per_share_columns.contains(c))
        .collect();
    let is_ratio: Vec<bool> = table
        .columns
        .iter()
        .map(|c| config.ratio_columns.contains(c))
        .collect();

    // Dense value matrix, NaN for unreported metrics
    let mut values: Vec<Vec<f64>> = table
        .records
        .iter()
        .map(|r| {
            r.values
                .iter()
                .enumerate()
                .map(|(j, v)| match v {
                    Some(x) if x.is_finite() && is_per_share[j] => signed_log(*x),
                    Some(x) if x.is_finite() => *x,
                    _ => f64::NAN,
                })
                .collect()
        })
        .collect();

    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in table.records.iter().enumerate() {
        by_date.entry(record.date).or_default().push(i);
    }

    for (date, rows) in &by_date {
        for j in 0..n_metrics {
            let mut column: Vec<f64> = rows.iter().map(|&i| values[i][j]).collect();
            if is_ratio[j] {
                winsorize_mad(&mut column, config.winsor_k);
            }
            zscore(&mut column);
            for (&i, v) in rows.iter().zip(column) {
                values[i][j] = v;
            }
        }
        debug!("Normalized {} fundamental reports dated {}", rows.len(), date);
    }

    let mut columns = table.columns.clone();
    columns.extend(table.columns.iter().map(|c| format!("{}_na", c)));

    let records = table
        .records
        .iter()
        .zip(values)
        .map(|(record, row)| {
            let mut out = Vec::with_capacity(n_metrics * 2);
            out.extend(row.iter().map(|v| if v.is_finite() { *v } else { 0.0 }));
            out.extend(row.iter().map(|v| if v.is_finite() { 0.0 } else { 1.0 }));
            NormalizedRecord {
                instrument: record.instrument.clone(),
                date: record.date,
                values: out,
            }
        })
        .collect();

    NormalizedFundamentals {
        columns,
        n_metrics,
        records,
    }
}
