// src/store/mod.rs
//
// Tabular data store.
// A snapshot (price table, feature table, metadata) is immutable once built.
// The store hands out `Arc<Snapshot>` clones; a refresh builds a complete new
// snapshot off the async runtime and swaps the `Arc` in one short write lock,
// so in-flight readers keep the snapshot they started with.

pub mod files;

pub use files::{
    parse_date, read_bars, read_benchmark, read_feature_table, read_fundamentals, read_metadata,
    read_price_table, write_feature_table, write_price_table, CsvSnapshotLoader,
};

use crate::error::PipelineError;
use crate::models::{FeatureTable, InstrumentMeta, PriceTable};
use crate::traits::{Refreshable, SnapshotLoader};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// One consistent view of the data.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub prices: PriceTable,
    pub features: FeatureTable,
    pub metadata: HashMap<String, InstrumentMeta>,
    /// Unix timestamp of construction
    pub loaded_at: i64,
}

impl Snapshot {
    pub fn new(
        prices: PriceTable,
        features: FeatureTable,
        metadata: HashMap<String, InstrumentMeta>,
    ) -> Self {
        Self {
            prices,
            features,
            metadata,
            loaded_at: Utc::now().timestamp(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.prices.len() + self.features.len()
    }
}

/// Holds the current snapshot.
///
/// Uses std::sync::RwLock: the lock only guards an `Arc` swap, never I/O.
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
    loader: Option<Arc<dyn SnapshotLoader>>,
}

impl SnapshotStore {
    /// An empty store that loads through `loader`.
    pub fn new(loader: Arc<dyn SnapshotLoader>) -> Self {
        Self {
            current: RwLock::new(None),
            loader: Some(loader),
        }
    }

    /// A store serving a fixed snapshot (no loader, refresh fails).
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
            loader: None,
        }
    }

    /// The snapshot at the time of the call.
    pub fn current(&self) -> Result<Arc<Snapshot>, PipelineError> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(PipelineError::SnapshotNotLoaded)
    }

    /// Swaps in a new snapshot and returns it.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(snapshot.clone());
        snapshot
    }

    fn loader(&self) -> Result<Arc<dyn SnapshotLoader>, PipelineError> {
        self.loader
            .clone()
            .ok_or_else(|| PipelineError::Config("snapshot store has no loader".to_string()))
    }
}

#[async_trait]
impl Refreshable for SnapshotStore {
    async fn refresh(&self) -> Result<usize, PipelineError> {
        let loader = self.loader()?;
        let snapshot = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;
        let rows = snapshot.row_count();
        self.replace(snapshot);
        info!("Snapshot refreshed ({} rows)", rows);
        Ok(rows)
    }

    fn last_updated(&self) -> i64 {
        self.current().map(|s| s.loaded_at).unwrap_or(0)
    }
}

/// Refreshes `store` every `period` until the task is aborted.
/// A failed refresh keeps the previous snapshot.
pub fn spawn_periodic_refresh(store: Arc<dyn Refreshable>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.refresh().await {
                Ok(rows) => info!("Periodic refresh loaded {} rows", rows),
                Err(e) => error!("Periodic refresh failed, keeping previous snapshot: {}", e),
            }
        }
    })
}
