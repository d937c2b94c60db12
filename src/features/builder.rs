// src/features/builder.rs
//
// Feature & label builder: weekly bars + benchmark + fundamentals in,
// point-in-time feature table out. Instruments are processed independently
// and in parallel.

use super::fundamentals::{normalize_fundamentals, NormalizedFundamentals};
use super::labels::{label_quarters, JoinedRow};
use super::merge::asof_join;
use super::resample::{resample_series, resample_weekly};
use super::technicals::{compute_technicals, technical_columns};
use crate::config::FeatureConfig;
use crate::error::PipelineError;
use crate::models::{FeatureRow, FeatureTable, FundamentalTable, PriceBar};
use log::{debug, info};
use rayon::prelude::*;

/// Builds the feature/label table.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Technical columns followed by fundamental columns and their `_na` flags.
    pub fn feature_names(&self, fundamentals: &NormalizedFundamentals) -> Vec<String> {
        let mut names = technical_columns(&self.config);
        names.extend(fundamentals.columns.iter().cloned());
        names
    }

    /// Builds the table from raw (daily or weekly) bars.
    ///
    /// `benchmark` may carry any instrument name; it is treated as one series.
    pub fn build(
        &self,
        bars: &[PriceBar],
        benchmark: &[PriceBar],
        fundamentals: &FundamentalTable,
    ) -> Result<FeatureTable, PipelineError> {
        validate_fundamentals(fundamentals)?;

        let weekly = resample_weekly(bars);
        let benchmark = weekly_benchmark(benchmark);
        let normalized = normalize_fundamentals(fundamentals, &self.config);
        let by_instrument = normalized.by_instrument();
        let n_metrics = normalized.n_metrics;

        info!(
            "Building features for {} instruments ({} benchmark weeks, {} fundamental reports)",
            weekly.len(),
            benchmark.len(),
            normalized.records.len()
        );

        let rows: Vec<FeatureRow> = weekly
            .par_iter()
            .flat_map(|(instrument, series)| {
                let Some(records) = by_instrument.get(instrument.as_str()) else {
                    debug!("{}: no fundamentals, skipped", instrument);
                    return Vec::new();
                };
                let technicals = compute_technicals(series, &benchmark, &self.config);
                let joined: Vec<JoinedRow> =
                    asof_join(&technicals, records, |t| t.date, |r| r.date)
                        .into_iter()
                        .map(|(tech, record)| JoinedRow {
                            date: tech.date,
                            close_raw: tech.close_raw,
                            close_benchmark: tech.close_benchmark,
                            technicals: tech.values.clone(),
                            fundamentals: record.values.clone(),
                        })
                        .collect();
                label_quarters(instrument, joined, n_metrics)
            })
            .collect();

        let table = FeatureTable::new(self.feature_names(&normalized), rows);
        info!(
            "Built {} feature rows for {} instruments",
            table.len(),
            table.instruments().len()
        );
        Ok(table)
    }
}

fn validate_fundamentals(table: &FundamentalTable) -> Result<(), PipelineError> {
    let expected = table.columns.len();
    match table.records.iter().find(|r| r.values.len() != expected) {
        Some(bad) => Err(PipelineError::DataGap(format!(
            "fundamental record for {} on {} has {} values, expected {}",
            bad.instrument,
            bad.date,
            bad.values.len(),
            expected
        ))),
        None => Ok(()),
    }
}

fn weekly_benchmark(benchmark: &[PriceBar]) -> Vec<PriceBar> {
    let mut series = benchmark.to_vec();
    series.sort_by_key(|b| b.date);
    series.dedup_by_key(|b| b.date);
    resample_series(&series)
}
