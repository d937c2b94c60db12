// src/config.rs
//
// Configuration file parsing.
// A single TOML file drives data locations, feature windows, the selection
// threshold and optimizer settings. Every field has a default.

use crate::error::PipelineError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

// =============================================================================
// Configuration Types
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: Option<String>,
    /// Snapshot refresh interval in seconds (None = load once)
    pub refresh_interval_secs: Option<u64>,
}

/// File locations.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Long price table: date, ticker, price
    #[serde(default = "default_prices_path")]
    pub prices_path: String,
    /// Feature/label table produced by `build-features`
    #[serde(default = "default_features_path")]
    pub features_path: String,
    /// Optional instrument metadata: ticker, name, sector, industry
    pub metadata_path: Option<String>,
    /// Directory scanned for classifier model files (*.json)
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Raw bars used to build features: ticker, date, open, high, low, close, volume
    pub bars_path: Option<String>,
    /// Benchmark bars: date, close[, volume]
    pub benchmark_path: Option<String>,
    /// Fundamentals: ticker, date, <metrics...>
    pub fundamentals_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            prices_path: default_prices_path(),
            features_path: default_features_path(),
            metadata_path: None,
            models_dir: default_models_dir(),
            bars_path: None,
            benchmark_path: None,
            fundamentals_path: None,
        }
    }
}

fn default_prices_path() -> String {
    "data/prices.csv".to_string()
}

fn default_features_path() -> String {
    "data/dataset.csv".to_string()
}

fn default_models_dir() -> String {
    "models".to_string()
}

/// Feature & label builder settings. Windows are in weeks.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Trailing window for the volume z-score
    #[serde(default = "default_long_window")]
    pub volume_window: usize,
    /// Bollinger band width in standard deviations
    #[serde(default = "default_band_width")]
    pub band_width: f64,
    /// Ratio columns are clipped to median +/- k * MAD per reporting date
    #[serde(default = "default_winsor_k")]
    pub winsor_k: f64,
    /// Dollar-per-share metrics (signed log before normalization)
    #[serde(default = "default_per_share_columns")]
    pub per_share_columns: Vec<String>,
    /// Ratio and margin metrics (MAD clipped before normalization)
    #[serde(default = "default_ratio_columns")]
    pub ratio_columns: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            trend_window: default_trend_window(),
            volume_window: default_long_window(),
            band_width: default_band_width(),
            winsor_k: default_winsor_k(),
            per_share_columns: default_per_share_columns(),
            ratio_columns: default_ratio_columns(),
        }
    }
}

fn default_short_window() -> usize {
    13
}

fn default_long_window() -> usize {
    26
}

fn default_trend_window() -> usize {
    52
}

fn default_band_width() -> f64 {
    2.0
}

fn default_winsor_k() -> f64 {
    3.0
}

fn default_per_share_columns() -> Vec<String> {
    [
        "Book Value Per Share",
        "Free Cash Flow Per Share",
        "Operating Cash Flow Per Share",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ratio_columns() -> Vec<String> {
    [
        "Asset Turnover",
        "Current Ratio",
        "Debt/Equity Ratio",
        "EBIT Margin",
        "Gross Margin",
        "Net Profit Margin",
        "Operating Margin",
        "Pre-Tax Profit Margin",
        "ROA - Return On Assets",
        "ROE - Return On Equity",
        "ROI - Return On Investment",
        "Return On Tangible Equity",
        "Inventory Turnover Ratio",
        "Days Sales In Receivables",
        "Receiveable Turnover",
        "Long-term Debt / Capital",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Ticker selection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Instruments whose mean latest-quarter probability exceeds this are selected
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    0.6
}

/// Risk optimizer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizationConfig {
    /// Periods per year of the price table (52 for weekly data)
    #[serde(default = "default_annualization_factor")]
    pub annualization_factor: f64,
    /// Cluster count for nested clustering (None = ceil(sqrt(n)))
    pub nco_max_clusters: Option<usize>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            annualization_factor: default_annualization_factor(),
            nco_max_clusters: None,
        }
    }
}

fn default_annualization_factor() -> f64 {
    52.0
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(s: &str) -> Result<Self, PipelineError> {
        let config: Config = toml::from_str(s)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let f = &self.features;
        if f.short_window < 2 || f.long_window < 2 || f.trend_window < 2 || f.volume_window < 2 {
            return Err(PipelineError::Config(
                "Feature windows must be at least 2 periods".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.selection.threshold) {
            return Err(PipelineError::Config(format!(
                "Selection threshold {} is outside [0, 1]",
                self.selection.threshold
            )));
        }
        if self.optimization.annualization_factor <= 0.0 {
            return Err(PipelineError::Config(
                "annualization_factor must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Default Configuration
// =============================================================================

/// Returns a default configuration string for documentation.
pub fn default_config_template() -> &'static str {
    r#"# Portfolio Picker Configuration

[global]
log_level = "info"
# Rebuild the in-memory snapshot every day (omit to load once)
refresh_interval_secs = 86400

[data]
prices_path = "data/prices.csv"
features_path = "data/dataset.csv"
metadata_path = "data/metadata.csv"
models_dir = "models"

# Inputs for --mode build-features
bars_path = "data/bars.csv"
benchmark_path = "data/spy.csv"
fundamentals_path = "data/financials/ratios_raw.csv"

[features]
short_window = 13
long_window = 26
trend_window = 52
volume_window = 26
band_width = 2.0
winsor_k = 3.0

[selection]
threshold = 0.6

[optimization]
annualization_factor = 52.0
# nco_max_clusters = 4
"#
}

// =============================================================================
// Tests
// =============================================================================
