// src/models.rs

use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of the within-quarter position column appended to the model input.
pub const SINCE_QUARTER_START: &str = "since_quarter_start";

// =============================================================================
// Market Data
// =============================================================================

/// One OHLCV bar for an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub instrument: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Creates a bar where open/high/low equal the close.
    pub fn from_close(instrument: impl Into<String>, date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            instrument: instrument.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }
}

/// A single (date, instrument, price) observation of the pre-joined price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub instrument: String,
    pub date: NaiveDate,
    pub price: f64,
}

/// The pre-joined long price table (date, instrument, price).
///
/// Points are kept sorted by (date, instrument) with one price per pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    points: Vec<PricePoint>,
}

impl PriceTable {
    /// Sorts the points; for a repeated (date, instrument) pair the last one wins.
    pub fn new(points: Vec<PricePoint>) -> Self {
        let mut keyed: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
        for p in points {
            keyed.insert((p.date, p.instrument), p.price);
        }
        Self {
            points: keyed
                .into_iter()
                .map(|((date, instrument), price)| PricePoint {
                    instrument,
                    date,
                    price,
                })
                .collect(),
        }
    }

    /// Close of every finite bar, one point per (date, instrument).
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        Self::new(
            bars.iter()
                .filter(|b| b.close.is_finite())
                .map(|b| PricePoint {
                    instrument: b.instrument.clone(),
                    date: b.date,
                    price: b.close,
                })
                .collect(),
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn instruments(&self) -> BTreeSet<String> {
        self.points.iter().map(|p| p.instrument.clone()).collect()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Latest finite price per instrument, optionally as of `cutoff`.
    pub fn last_prices(&self, cutoff: Option<NaiveDate>) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for p in &self.points {
            if cutoff.map_or(false, |c| p.date > c) {
                break;
            }
            if p.price.is_finite() {
                out.insert(p.instrument.clone(), p.price);
            }
        }
        out
    }
}

/// Per-instrument classification attributes supplied by the metadata source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub instrument: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

// =============================================================================
// Fundamentals
// =============================================================================

/// A fundamental report for an instrument, effective from `date`.
/// `None` marks a metric the source did not report.
#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalRecord {
    pub instrument: String,
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// Fundamental reports keyed by (instrument, effective date).
#[derive(Debug, Clone, Default)]
pub struct FundamentalTable {
    pub columns: Vec<String>,
    pub records: Vec<FundamentalRecord>,
}

impl FundamentalTable {
    pub fn new(columns: Vec<String>, records: Vec<FundamentalRecord>) -> Self {
        Self { columns, records }
    }
}

// =============================================================================
// Feature Table
// =============================================================================

/// One weekly observation of an instrument with its model features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub instrument: String,
    pub date: NaiveDate,
    /// Per-instrument counter of fundamental regimes, starting at 1.
    pub quarter_id: u32,
    /// Zero-based position within the quarter divided by the quarter's row count.
    pub since_quarter_start: f64,
    /// Values aligned with `FeatureTable::feature_names`.
    pub features: Vec<f64>,
    /// Unscaled weekly close.
    pub close_raw: f64,
    pub outperformed: Option<bool>,
}

/// The point-in-time feature/label dataset.
///
/// Rows are sorted by (instrument, date) and never mutated after construction;
/// a data refresh builds a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(feature_names: Vec<String>, mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| a.instrument.cmp(&b.instrument).then(a.date.cmp(&b.date)));
        Self { feature_names, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column order of the classifier input: every feature followed by
    /// `since_quarter_start`. Identifier, date, quarter id, raw price and
    /// label never enter the model.
    pub fn model_columns(&self) -> Vec<String> {
        let mut cols = self.feature_names.clone();
        cols.push(SINCE_QUARTER_START.to_string());
        cols
    }

    /// Builds the rows x model_columns input matrix.
    ///
    /// Fails with `DataGap` when a row's width differs from `feature_names`.
    pub fn model_matrix(&self) -> Result<Array2<f64>, PipelineError> {
        let n_features = self.feature_names.len();
        if let Some(bad) = self.rows.iter().find(|r| r.features.len() != n_features) {
            return Err(PipelineError::DataGap(format!(
                "feature row for {} on {} has {} values, expected {}",
                bad.instrument,
                bad.date,
                bad.features.len(),
                n_features
            )));
        }
        let mut matrix = Array2::<f64>::zeros((self.rows.len(), n_features + 1));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, value) in row.features.iter().enumerate() {
                matrix[[i, j]] = *value;
            }
            matrix[[i, n_features]] = row.since_quarter_start;
        }
        Ok(matrix)
    }

    /// Rows dated on or before `cutoff`.
    pub fn up_to(&self, cutoff: NaiveDate) -> FeatureTable {
        FeatureTable {
            feature_names: self.feature_names.clone(),
            rows: self.rows.iter().filter(|r| r.date <= cutoff).cloned().collect(),
        }
    }

    pub fn instruments(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.instrument.clone()).collect()
    }
}

// =============================================================================
// Portfolio Records
// =============================================================================

/// The plain record emitted for an accepted portfolio. Storage is the host's
/// concern; the rebalancer only needs the weights, capital and as-of date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    pub capital: f64,
    pub risk_model: String,
    pub as_of: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl PortfolioRecord {
    pub fn instruments(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }
}

impl fmt::Display for PortfolioRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "portfolio[{}] {} instruments, capital {:.2}, {} as of {}",
            self.id.as_deref().unwrap_or("-"),
            self.weights.len(),
            self.capital,
            self.risk_model,
            self.as_of
        )
    }
}
