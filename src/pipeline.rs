// src/pipeline.rs
//
// Request-scoped portfolio service.
// Each request grabs the current snapshot once and works on it alone; the
// CPU-bound work runs on the blocking pool so concurrent requests do not
// queue behind each other.

use crate::allocation::{normalize_weights, Allocation};
use crate::config::SelectionConfig;
use crate::error::PipelineError;
use crate::models::PortfolioRecord;
use crate::optimizer::{optimize_portfolio, PortfolioSummary};
use crate::rebalance::{rebalance, RebalanceOutcome, RebalanceRequest};
use crate::registry::ModelRegistry;
use crate::report::{
    correlation_matrix, drawdown, equity_curve, performance, sector_weights, CorrelationMatrix, CurvePoint,
};
use crate::selector::{Selection, TickerSelector};
use crate::store::SnapshotStore;
use chrono::{Duration, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// Registered picker name
    pub model: String,
    /// Registered risk function name
    pub risk_model: String,
    /// Features and prices after this date are ignored (default: latest price date)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub capital: f64,
    /// Live prices overriding the table's last prices
    #[serde(default)]
    pub prices: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeResponse {
    pub selection: Selection,
    /// Continuous weights from the risk function
    pub optimized_weights: BTreeMap<String, f64>,
    pub allocation: Allocation,
    pub summary: PortfolioSummary,
    pub equity_curve: Vec<CurvePoint>,
    pub drawdown: Vec<CurvePoint>,
    pub sector_weights: BTreeMap<String, f64>,
    pub record: PortfolioRecord,
}

/// How a stored portfolio has fared up to a date.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub as_of: NaiveDate,
    /// Fixed-weight equity over the full history
    pub equity_curve: Vec<CurvePoint>,
    pub drawdown: Vec<CurvePoint>,
    /// Equity from the record's own date onwards
    pub performance: Vec<CurvePoint>,
    pub sector_weights: BTreeMap<String, f64>,
    pub correlation: CorrelationMatrix,
}

pub struct PortfolioService {
    store: Arc<SnapshotStore>,
    registry: Arc<ModelRegistry>,
    selector: TickerSelector,
}

impl PortfolioService {
    pub fn new(store: Arc<SnapshotStore>, registry: Arc<ModelRegistry>, selection: &SelectionConfig) -> Self {
        Self {
            store,
            registry,
            selector: TickerSelector::new(selection.threshold),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Select, optimize and allocate on the calling thread.
    pub fn run_optimize(&self, request: &OptimizeRequest) -> Result<OptimizeResponse, PipelineError> {
        let snapshot = self.store.current()?;
        let classifier = self.registry.get_picker(&request.model)?;
        let optimizer = self.registry.get_risk_model(&request.risk_model)?;

        let end = request.end_date.or_else(|| snapshot.prices.last_date());
        let features = match end {
            Some(date) => snapshot.features.up_to(date),
            None => snapshot.features.clone(),
        };

        let selection = self
            .selector
            .select(&features, classifier.as_ref())?
            .require_non_empty()?;

        let optimized = optimize_portfolio(&snapshot.prices, &selection.selected, end, optimizer.as_ref())?;

        let mut last_prices = snapshot.prices.last_prices(end);
        if let Some(live) = &request.prices {
            last_prices.extend(live.iter().map(|(k, v)| (k.clone(), *v)));
        }
        let allocation = normalize_weights(&optimized.weights, &last_prices, request.capital);

        let summary = optimized.portfolio.summary();
        let curve = equity_curve(&optimized.portfolio);
        let drawdown = drawdown(&curve);
        let weights = allocation.weights();
        let sectors = sector_weights(&weights, &snapshot.metadata);

        info!(
            "{} + {}: {} selected, {} allocated, {:.2} left over",
            request.model,
            request.risk_model,
            selection.selected.len(),
            allocation.positions.len(),
            allocation.leftover_capital
        );

        let record = PortfolioRecord {
            id: None,
            weights,
            stats: summary.to_map(),
            capital: request.capital,
            risk_model: request.risk_model.clone(),
            as_of: end.unwrap_or_else(|| Utc::now().date_naive()),
            created_at: Utc::now(),
        };

        Ok(OptimizeResponse {
            selection,
            optimized_weights: optimized.weights,
            allocation,
            summary,
            equity_curve: curve,
            drawdown,
            sector_weights: sectors,
            record,
        })
    }

    /// Re-optimize a stored portfolio on the calling thread.
    pub fn run_rebalance(
        &self,
        record: &PortfolioRecord,
        request: &RebalanceRequest,
    ) -> Result<RebalanceOutcome, PipelineError> {
        let snapshot = self.store.current()?;
        let risk_model = request.risk_model.as_deref().unwrap_or(&record.risk_model);
        let optimizer = self.registry.get_risk_model(risk_model)?;
        rebalance(&snapshot.prices, record, request, optimizer.as_ref())
    }

    /// Equity, drawdown, since-record performance, sectors and correlation of
    /// a stored portfolio, using prices up to `as_of`.
    pub fn portfolio_report(&self, record: &PortfolioRecord, as_of: NaiveDate) -> Result<PortfolioReport, PipelineError> {
        if record.weights.is_empty() {
            return Err(PipelineError::DataGap("portfolio has no instruments".to_string()));
        }
        if as_of < record.as_of {
            return Err(PipelineError::Config(format!(
                "report date {} is before the portfolio date {}",
                as_of, record.as_of
            )));
        }
        let snapshot = self.store.current()?;

        let equity = performance(&snapshot.prices, &record.weights, None, Some(as_of))?;
        let drawdown = drawdown(&equity);
        let since = performance(
            &snapshot.prices,
            &record.weights,
            Some(record.as_of + Duration::days(1)),
            Some(as_of),
        )?;
        let sectors = sector_weights(&record.weights, &snapshot.metadata);
        let correlation = correlation_matrix(&snapshot.prices, &record.instruments(), Some(as_of))?;

        info!(
            "Report for {} holdings as of {}: {} periods since {}",
            record.weights.len(),
            as_of,
            since.len(),
            record.as_of
        );

        Ok(PortfolioReport {
            as_of,
            equity_curve: equity,
            drawdown,
            performance: since,
            sector_weights: sectors,
            correlation,
        })
    }

    /// `run_optimize` on the blocking pool.
    pub async fn optimize(self: &Arc<Self>, request: OptimizeRequest) -> Result<OptimizeResponse, PipelineError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.run_optimize(&request))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// `run_rebalance` on the blocking pool.
    pub async fn rebalance(
        self: &Arc<Self>,
        record: PortfolioRecord,
        request: RebalanceRequest,
    ) -> Result<RebalanceOutcome, PipelineError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.run_rebalance(&record, &request))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// `portfolio_report` on the blocking pool.
    pub async fn report(self: &Arc<Self>, record: PortfolioRecord, as_of: NaiveDate) -> Result<PortfolioReport, PipelineError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.portfolio_report(&record, as_of))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}
