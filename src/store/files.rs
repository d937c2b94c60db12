// src/store/files.rs
//
// CSV readers and writers for the data files, and the loader that builds a
// snapshot from them.
//
// Layouts:
//   prices        date, ticker, price
//   bars          ticker, date, open, high, low, close, volume
//   benchmark     date, close[, volume]
//   fundamentals  ticker, date, <metric columns...>
//   metadata      ticker[, name, sector, industry]
//   features      ticker, date, quarter_id, since_quarter_start, <features...>,
//                 close_raw, outperformed

use super::Snapshot;
use crate::error::PipelineError;
use crate::models::{
    FeatureRow, FeatureTable, FundamentalRecord, FundamentalTable, InstrumentMeta, PriceBar,
    PricePoint, PriceTable,
};
use crate::traits::SnapshotLoader;
use chrono::NaiveDate;
use csv::{Reader, StringRecord, Writer};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const BENCHMARK_ID: &str = "benchmark";

/// Accepts `%Y-%m-%d` and `%Y%m%d`.
pub fn parse_date(s: &str) -> Result<NaiveDate, PipelineError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| PipelineError::Parse(format!("invalid date '{}'", s)))
}

/// Empty cells and "nan"/"NA" are missing.
fn parse_optional_f64(s: &str) -> Result<Option<f64>, PipelineError> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::Parse(format!("invalid number '{}'", s)))
}

fn parse_f64(s: &str) -> Result<f64, PipelineError> {
    Ok(parse_optional_f64(s)?.unwrap_or(f64::NAN))
}

fn column(headers: &StringRecord, name: &str) -> Result<usize, PipelineError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| PipelineError::Parse(format!("missing column '{}'", name)))
}

fn ticker_column(headers: &StringRecord) -> Result<usize, PipelineError> {
    column(headers, "ticker").or_else(|_| column(headers, "instrument"))
}

// =============================================================================
// Prices, bars, benchmark
// =============================================================================

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    #[serde(alias = "instrument")]
    ticker: String,
    price: Option<f64>,
}

pub fn read_price_table<P: AsRef<Path>>(path: P) -> Result<PriceTable, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let mut points = Vec::new();
    for row in reader.deserialize::<PriceRow>() {
        let row = row?;
        if let Some(price) = row.price {
            points.push(PricePoint {
                instrument: row.ticker,
                date: parse_date(&row.date)?,
                price,
            });
        }
    }
    Ok(PriceTable::new(points))
}

pub fn write_price_table<P: AsRef<Path>>(path: P, table: &PriceTable) -> Result<(), PipelineError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["date", "ticker", "price"])?;
    for p in table.points() {
        writer.write_record([p.date.to_string(), p.instrument.clone(), p.price.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Raw bars. Missing open/high/low default to the close.
pub fn read_bars<P: AsRef<Path>>(path: P) -> Result<Vec<PriceBar>, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let ticker = ticker_column(&headers)?;
    let date = column(&headers, "date")?;
    let close = column(&headers, "close")?;
    let volume = column(&headers, "volume").ok();
    let open = column(&headers, "open").ok();
    let high = column(&headers, "high").ok();
    let low = column(&headers, "low").ok();

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let close_value = parse_f64(field(close))?;
        let or_close = |idx: Option<usize>| -> Result<f64, PipelineError> {
            match idx {
                Some(i) => Ok(parse_optional_f64(field(i))?.unwrap_or(close_value)),
                None => Ok(close_value),
            }
        };
        bars.push(PriceBar {
            instrument: field(ticker).trim().to_string(),
            date: parse_date(field(date))?,
            open: or_close(open)?,
            high: or_close(high)?,
            low: or_close(low)?,
            close: close_value,
            volume: match volume {
                Some(i) => parse_optional_f64(field(i))?.unwrap_or(0.0),
                None => 0.0,
            },
        });
    }
    debug!("Read {} bars", bars.len());
    Ok(bars)
}

/// Benchmark series as bars of the pseudo-instrument "benchmark".
pub fn read_benchmark<P: AsRef<Path>>(path: P) -> Result<Vec<PriceBar>, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let date = column(&headers, "date")?;
    let close = column(&headers, "close")?;
    let volume = column(&headers, "volume").ok();

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let vol = match volume {
            Some(i) => parse_optional_f64(field(i))?.unwrap_or(0.0),
            None => 0.0,
        };
        bars.push(PriceBar::from_close(
            BENCHMARK_ID,
            parse_date(field(date))?,
            parse_f64(field(close))?,
            vol,
        ));
    }
    Ok(bars)
}

// =============================================================================
// Fundamentals and metadata
// =============================================================================

pub fn read_fundamentals<P: AsRef<Path>>(path: P) -> Result<FundamentalTable, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let ticker = ticker_column(&headers)?;
    let date = column(&headers, "date")?;
    let metric_idx: Vec<usize> = (0..headers.len()).filter(|i| *i != ticker && *i != date).collect();
    let columns: Vec<String> = metric_idx.iter().map(|&i| headers[i].trim().to_string()).collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let values = metric_idx
            .iter()
            .map(|&i| parse_optional_f64(field(i)))
            .collect::<Result<Vec<_>, _>>()?;
        records.push(FundamentalRecord {
            instrument: field(ticker).trim().to_string(),
            date: parse_date(field(date))?,
            values,
        });
    }
    Ok(FundamentalTable::new(columns, records))
}

pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<HashMap<String, InstrumentMeta>, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let ticker = ticker_column(&headers)?;
    let optional = |name: &str| column(&headers, name).ok();
    let (name, sector, industry) = (optional("name"), optional("sector"), optional("industry"));

    let mut out = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let text = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        let meta = InstrumentMeta {
            instrument: record.get(ticker).unwrap_or("").trim().to_string(),
            name: text(name),
            sector: text(sector),
            industry: text(industry),
        };
        out.insert(meta.instrument.clone(), meta);
    }
    Ok(out)
}

// =============================================================================
// Feature table
// =============================================================================

const FEATURE_LEADING: [&str; 4] = ["ticker", "date", "quarter_id", "since_quarter_start"];
const FEATURE_TRAILING: [&str; 2] = ["close_raw", "outperformed"];

pub fn write_feature_table<P: AsRef<Path>>(path: P, table: &FeatureTable) -> Result<(), PipelineError> {
    let mut writer = Writer::from_path(path)?;
    let mut header: Vec<&str> = FEATURE_LEADING.to_vec();
    header.extend(table.feature_names.iter().map(|s| s.as_str()));
    header.extend(FEATURE_TRAILING);
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![
            row.instrument.clone(),
            row.date.to_string(),
            row.quarter_id.to_string(),
            row.since_quarter_start.to_string(),
        ];
        record.extend(row.features.iter().map(|v| v.to_string()));
        record.push(row.close_raw.to_string());
        record.push(row.outperformed.map(|b| b.to_string()).unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_feature_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable, PipelineError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let n = headers.len();
    let leading_ok = FEATURE_LEADING
        .iter()
        .enumerate()
        .all(|(i, name)| headers.get(i).map(|h| h.trim()) == Some(*name));
    if n < FEATURE_LEADING.len() + FEATURE_TRAILING.len() || !leading_ok {
        return Err(PipelineError::Parse(format!(
            "feature table must start with {:?} and end with {:?}",
            FEATURE_LEADING, FEATURE_TRAILING
        )));
    }
    let first_feature = FEATURE_LEADING.len();
    let close_idx = column(&headers, "close_raw")?;
    let label_idx = column(&headers, "outperformed")?;
    let feature_names: Vec<String> = (first_feature..close_idx)
        .map(|i| headers[i].trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let quarter_id = field(2)
            .trim()
            .parse::<u32>()
            .map_err(|_| PipelineError::Parse(format!("invalid quarter_id '{}'", field(2))))?;
        let features = (first_feature..close_idx)
            .map(|i| parse_f64(field(i)))
            .collect::<Result<Vec<_>, _>>()?;
        let outperformed = match field(label_idx).trim().to_ascii_lowercase().as_str() {
            "" => None,
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => return Err(PipelineError::Parse(format!("invalid label '{}'", other))),
        };
        rows.push(FeatureRow {
            instrument: field(0).trim().to_string(),
            date: parse_date(field(1))?,
            quarter_id,
            since_quarter_start: parse_f64(field(3))?,
            features,
            close_raw: parse_f64(field(close_idx))?,
            outperformed,
        });
    }
    Ok(FeatureTable::new(feature_names, rows))
}

// =============================================================================
// Snapshot loader
// =============================================================================

/// Loads the price table, feature table and optional metadata from CSV files.
#[derive(Debug, Clone)]
pub struct CsvSnapshotLoader {
    prices_path: PathBuf,
    features_path: PathBuf,
    metadata_path: Option<PathBuf>,
}

impl CsvSnapshotLoader {
    pub fn new(
        prices_path: impl Into<PathBuf>,
        features_path: impl Into<PathBuf>,
        metadata_path: Option<PathBuf>,
    ) -> Self {
        Self {
            prices_path: prices_path.into(),
            features_path: features_path.into(),
            metadata_path,
        }
    }

    pub fn from_config(data: &crate::config::DataConfig) -> Self {
        Self::new(
            &data.prices_path,
            &data.features_path,
            data.metadata_path.as_ref().map(PathBuf::from),
        )
    }
}

impl SnapshotLoader for CsvSnapshotLoader {
    fn load(&self) -> Result<Snapshot, PipelineError> {
        let prices = read_price_table(&self.prices_path)?;
        let features = read_feature_table(&self.features_path)?;
        let metadata = match &self.metadata_path {
            Some(path) => read_metadata(path)?,
            None => HashMap::new(),
        };
        info!(
            "Loaded {} prices, {} feature rows, {} metadata entries",
            prices.len(),
            features.len(),
            metadata.len()
        );
        Ok(Snapshot::new(prices, features, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("portfolio_picker_files_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        assert_eq!(parse_date("2023-06-30").unwrap(), expected);
        assert_eq!(parse_date("20230630").unwrap(), expected);
        assert!(matches!(parse_date("30/06/2023"), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_read_prices_skips_blank_prices() {
        let path = temp_file(
            "prices.csv",
            "date,ticker,price\n2024-01-05,AAA,10.5\n2024-01-05,BBB,\n20240112,AAA,11\n",
        );
        let table = read_price_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.last_prices(None)["AAA"], 11.0);
    }

    #[test]
    fn test_read_fundamentals_keeps_missing_cells() {
        let path = temp_file(
            "fundamentals.csv",
            "ticker,date,Gross Margin,Current Ratio\nAAA,2024-01-05,0.4,\nBBB,2024-01-05,0.3,1.2\n",
        );
        let table = read_fundamentals(&path).unwrap();
        assert_eq!(table.columns, vec!["Gross Margin", "Current Ratio"]);
        assert_eq!(table.records[0].values, vec![Some(0.4), None]);
    }

    #[test]
    fn test_read_bars_defaults_to_close() {
        let path = temp_file("bars.csv", "ticker,date,close,volume\nAAA,2024-01-02,10,100\n");
        let bars = read_bars(&path).unwrap();
        assert_eq!(bars[0].open, 10.0);
        assert_eq!(bars[0].volume, 100.0);
    }

    #[test]
    fn test_feature_table_file_round_trip() {
        let table = FeatureTable::new(
            vec!["close".to_string(), "Gross Margin_na".to_string()],
            vec![FeatureRow {
                instrument: "AAA".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                quarter_id: 3,
                since_quarter_start: 0.25,
                features: vec![2.5, 1.0],
                close_raw: 12.0,
                outperformed: Some(false),
            }],
        );
        let path = temp_file("features.csv", "");
        write_feature_table(&path, &table).unwrap();
        assert_eq!(read_feature_table(&path).unwrap(), table);
    }

    #[test]
    fn test_metadata_blank_sector_is_none() {
        let path = temp_file("meta.csv", "ticker,name,sector\nAAA,Alpha,Tech\nBBB,Beta,\n");
        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta["AAA"].sector.as_deref(), Some("Tech"));
        assert!(meta["BBB"].sector.is_none());
    }
}
