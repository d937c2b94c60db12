// src/main.rs
//
// Host binary for the portfolio picker.
// Builds the feature table from raw files, or loads a snapshot and runs the
// select -> optimize -> allocate pipeline, printing JSON to stdout.
// Stored portfolios can be rebalanced or reported on.

use chrono::NaiveDate;
use clap::Parser;
use portfolio_picker::config::{default_config_template, Config};
use portfolio_picker::features::FeatureBuilder;
use portfolio_picker::models::{FundamentalTable, PortfolioRecord, PriceTable};
use portfolio_picker::pipeline::{OptimizeRequest, PortfolioService};
use portfolio_picker::rebalance::RebalanceRequest;
use portfolio_picker::registry::ModelRegistry;
use portfolio_picker::store::{
    parse_date, read_bars, read_benchmark, read_fundamentals, spawn_periodic_refresh,
    write_feature_table, write_price_table, CsvSnapshotLoader, SnapshotStore,
};
use portfolio_picker::traits::{Refreshable, SharedRefreshable};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "portfolio-picker")]
#[command(about = "Classifier-driven stock selection, risk weighting and whole-share allocation")]
struct Args {
    /// Mode of operation: build-features, optimize, rebalance, report, watch, list
    #[arg(long, default_value = "optimize")]
    mode: String,

    /// Path to configuration file (TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Picker (classifier) name, as registered from the models directory
    #[arg(long)]
    model: Option<String>,

    /// Risk function: mean_variance, ledoit_wolf, nco, equal (default: mean_variance,
    /// or the record's risk model when rebalancing)
    #[arg(long)]
    risk_model: Option<String>,

    /// Ignore features and prices after this date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Capital to allocate (default: 10000, or the record's capital when rebalancing)
    #[arg(long)]
    capital: Option<f64>,

    /// Portfolio record (JSON) to rebalance or report on
    #[arg(long)]
    record: Option<String>,

    /// Rebalance or report date (YYYY-MM-DD), defaults to the latest price date
    #[arg(long)]
    as_of: Option<String>,

    /// Write the resulting portfolio record to this file
    #[arg(long)]
    output: Option<String>,

    /// Generate a default configuration file
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        println!("{}", default_config_template());
        return;
    }

    let config = load_config(&args);
    let level = config.global.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.mode.as_str() {
        "build-features" => run_build_features(&config),
        "optimize" => run_optimize_mode(&args, &config).await,
        "rebalance" => run_rebalance_mode(&args, &config).await,
        "report" => run_report_mode(&args, &config).await,
        "watch" => run_watch_mode(&args, &config).await,
        "list" => run_list_mode(&config),
        _ => {
            eprintln!(
                "Unknown mode: {}. Use: build-features, optimize, rebalance, report, watch, or list",
                args.mode
            );
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Config {
    match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                eprintln!("Use --generate-config to create a template.");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    }
}

/// Prints a message and exits non-zero.
fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => fail("Failed to serialize output", e),
    }
}

fn parse_date_arg(name: &str, value: &Option<String>) -> Option<NaiveDate> {
    value
        .as_deref()
        .map(|s| parse_date(s).unwrap_or_else(|e| fail(&format!("Invalid --{}", name), e)))
}

fn write_record(args: &Args, record: &PortfolioRecord) {
    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(record).unwrap_or_else(|e| fail("Failed to serialize record", e));
        if let Err(e) = std::fs::write(path, json) {
            fail(&format!("Failed to write {}", path), e);
        }
        eprintln!("Portfolio record written to {}", path);
    }
}

// =============================================================================
// Build Features Mode: raw bars + fundamentals -> feature table
// =============================================================================

fn run_build_features(config: &Config) {
    let data = &config.data;
    let (Some(bars_path), Some(benchmark_path)) = (&data.bars_path, &data.benchmark_path) else {
        fail("build-features", "data.bars_path and data.benchmark_path must be set");
    };

    let bars = read_bars(bars_path).unwrap_or_else(|e| fail("Failed to read bars", e));
    let benchmark = read_benchmark(benchmark_path).unwrap_or_else(|e| fail("Failed to read benchmark", e));
    let fundamentals = match &data.fundamentals_path {
        Some(path) => read_fundamentals(path).unwrap_or_else(|e| fail("Failed to read fundamentals", e)),
        None => FundamentalTable::default(),
    };

    let builder = FeatureBuilder::new(config.features.clone());
    let table = builder
        .build(&bars, &benchmark, &fundamentals)
        .unwrap_or_else(|e| fail("Feature build failed", e));

    if let Err(e) = write_feature_table(&data.features_path, &table) {
        fail("Failed to write feature table", e);
    }
    println!(
        "Wrote {} feature rows ({} columns) to {}",
        table.len(),
        table.feature_names.len(),
        data.features_path
    );

    // the long price table the optimizer reads
    let prices = PriceTable::from_bars(&bars);
    if let Err(e) = write_price_table(&data.prices_path, &prices) {
        fail("Failed to write price table", e);
    }
    println!("Wrote {} prices to {}", prices.len(), data.prices_path);
}

// =============================================================================
// Optimize / Rebalance Modes
// =============================================================================

async fn build_service(config: &Config) -> Arc<PortfolioService> {
    let store = Arc::new(SnapshotStore::new(Arc::new(CsvSnapshotLoader::from_config(&config.data))));
    if let Err(e) = store.refresh().await {
        fail("Failed to load data snapshot", e);
    }

    let mut registry = ModelRegistry::new(&config.optimization);
    if let Err(e) = registry.scan(&config.data.models_dir) {
        fail(&format!("Failed to scan models in {}", config.data.models_dir), e);
    }

    Arc::new(PortfolioService::new(store, Arc::new(registry), &config.selection))
}

fn optimize_request(args: &Args) -> OptimizeRequest {
    let Some(model) = args.model.clone() else {
        fail("optimize", "--model is required (see --mode list)");
    };
    OptimizeRequest {
        model,
        risk_model: args.risk_model.clone().unwrap_or_else(|| "mean_variance".to_string()),
        end_date: parse_date_arg("end-date", &args.end_date),
        capital: args.capital.unwrap_or(10_000.0),
        prices: None,
    }
}

async fn run_optimize_mode(args: &Args, config: &Config) {
    let request = optimize_request(args);
    let service = build_service(config).await;

    match service.optimize(request).await {
        Ok(response) => {
            write_record(args, &response.record);
            print_json(&response);
        }
        Err(e) if e.is_empty_selection() => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
        Err(e) => fail("Optimization failed", e),
    }
}

fn read_record(mode: &str, args: &Args) -> PortfolioRecord {
    let Some(path) = &args.record else {
        fail(mode, "--record is required");
    };
    std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
        .unwrap_or_else(|e| fail(&format!("Failed to read record {}", path), e))
}

fn as_of_date(mode: &str, args: &Args, service: &PortfolioService) -> NaiveDate {
    parse_date_arg("as-of", &args.as_of)
        .or_else(|| service.store().current().ok().and_then(|s| s.prices.last_date()))
        .unwrap_or_else(|| fail(mode, "no --as-of given and the price table is empty"))
}

async fn run_rebalance_mode(args: &Args, config: &Config) {
    let record = read_record("rebalance", args);
    let service = build_service(config).await;
    let as_of = as_of_date("rebalance", args, &service);

    let mut request = RebalanceRequest::new(as_of);
    request.capital = args.capital;
    request.risk_model = args.risk_model.clone();

    match service.rebalance(record, request).await {
        Ok(outcome) => {
            write_record(args, &outcome.record);
            print_json(&outcome);
        }
        Err(e) => fail("Rebalance failed", e),
    }
}

async fn run_report_mode(args: &Args, config: &Config) {
    let record = read_record("report", args);
    let service = build_service(config).await;
    let as_of = as_of_date("report", args, &service);

    match service.report(record, as_of).await {
        Ok(report) => print_json(&report),
        Err(e) => fail("Report failed", e),
    }
}

// =============================================================================
// Watch Mode: periodic snapshot refresh + re-optimization
// =============================================================================

async fn run_watch_mode(args: &Args, config: &Config) {
    let Some(secs) = config.global.refresh_interval_secs else {
        fail("watch", "global.refresh_interval_secs must be set");
    };
    let period = Duration::from_secs(secs.max(1));
    let request = optimize_request(args);
    let service = build_service(config).await;

    let store: SharedRefreshable = service.store().clone();
    let _refresh = spawn_periodic_refresh(store, period);

    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match service.optimize(request.clone()).await {
            Ok(response) => {
                write_record(args, &response.record);
                print_json(&response);
            }
            Err(e) => eprintln!("Optimization failed: {}", e),
        }
    }
}

fn run_list_mode(config: &Config) {
    let mut registry = ModelRegistry::new(&config.optimization);
    if let Err(e) = registry.scan(&config.data.models_dir) {
        eprintln!("Failed to scan models in {}: {}", config.data.models_dir, e);
    }
    println!("Pickers:");
    for name in registry.list_pickers() {
        println!("  {}", name);
    }
    println!("Risk models:");
    for name in registry.list_risk_models() {
        println!("  {}", name);
    }
}
