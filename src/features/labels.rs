// src/features/labels.rs
//
// Quarter detection and labeling for one instrument.
// A quarter is a run of consecutive rows whose fundamental inputs are
// identical. Every row of a quarter carries the same label: whether the
// instrument's return over the quarter beat the benchmark's return over the
// same span.

use crate::models::FeatureRow;
use log::debug;

/// A technical row joined with the fundamental record in force on its date.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub date: chrono::NaiveDate,
    pub close_raw: f64,
    pub close_benchmark: f64,
    pub technicals: Vec<f64>,
    /// Normalized metrics followed by their missing indicators
    pub fundamentals: Vec<f64>,
}

impl JoinedRow {
    fn is_complete(&self) -> bool {
        self.close_raw.is_finite()
            && self.close_benchmark.is_finite()
            && self.technicals.iter().all(|v| v.is_finite())
            && self.fundamentals.iter().all(|v| v.is_finite())
    }
}

/// Assigns per-row quarter ids, starting at 1. A new quarter begins on the
/// first row and whenever any of the first `n_metrics` fundamental values
/// differs from the previous row.
pub fn quarter_ids(rows: &[JoinedRow], n_metrics: usize) -> Vec<u32> {
    let mut ids = Vec::with_capacity(rows.len());
    let mut previous: Option<&[f64]> = None;
    let mut current = 0u32;

    for row in rows {
        let metrics = &row.fundamentals[..n_metrics.min(row.fundamentals.len())];
        if previous != Some(metrics) {
            current += 1;
        }
        ids.push(current);
        previous = Some(metrics);
    }

    ids
}

/// Label of one quarter, or None when it cannot be labeled
/// (fewer than 2 rows or a non-positive starting price).
pub fn quarter_label(quarter: &[JoinedRow]) -> Option<bool> {
    if quarter.len() < 2 {
        return None;
    }
    let first = quarter.first()?;
    let last = quarter.last()?;
    if first.close_raw <= 0.0 || first.close_benchmark <= 0.0 {
        return None;
    }
    let stock_ret = last.close_raw / first.close_raw - 1.0;
    let bench_ret = last.close_benchmark / first.close_benchmark - 1.0;
    Some(stock_ret > bench_ret)
}

/// Turns one instrument's date-sorted joined rows into labeled feature rows.
///
/// Rows with missing values are removed before quarters are detected;
/// quarters that cannot be labeled are dropped.
pub fn label_quarters(instrument: &str, rows: Vec<JoinedRow>, n_metrics: usize) -> Vec<FeatureRow> {
    let total = rows.len();
    let rows: Vec<JoinedRow> = rows.into_iter().filter(JoinedRow::is_complete).collect();
    let ids = quarter_ids(&rows, n_metrics);

    let mut out = Vec::with_capacity(rows.len());
    let mut start = 0;
    while start < rows.len() {
        let id = ids[start];
        let end = start + ids[start..].iter().take_while(|q| **q == id).count();
        let quarter = &rows[start..end];

        match quarter_label(quarter) {
            Some(outperformed) => {
                let len = quarter.len() as f64;
                out.extend(quarter.iter().enumerate().map(|(pos, row)| {
                    let mut features = row.technicals.clone();
                    features.extend_from_slice(&row.fundamentals);
                    FeatureRow {
                        instrument: instrument.to_string(),
                        date: row.date,
                        quarter_id: id,
                        since_quarter_start: pos as f64 / len,
                        features,
                        close_raw: row.close_raw,
                        outperformed: Some(outperformed),
                    }
                }));
            }
            None => debug!(
                "{}: quarter {} ({} rows) cannot be labeled, dropped",
                instrument,
                id,
                quarter.len()
            ),
        }
        start = end;
    }

    debug!("{}: {} of {} joined rows kept", instrument, out.len(), total);
    out
}
