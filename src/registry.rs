// src/registry.rs
//
// Explicitly constructed registry of classifiers ("pickers") and risk
// functions, looked up by name.

use crate::classifier::load_model_spec;
use crate::config::OptimizationConfig;
use crate::error::PipelineError;
use crate::optimizer::{EqualWeighted, MinimumVariance, NestedClusters};
use crate::traits::{SharedClassifier, SharedRiskOptimizer};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const RISK_MODELS: [&str; 4] = ["mean_variance", "ledoit_wolf", "nco", "equal"];

pub struct ModelRegistry {
    pickers: BTreeMap<String, SharedClassifier>,
    risk_models: BTreeMap<String, SharedRiskOptimizer>,
}

impl ModelRegistry {
    /// A registry with the built-in risk functions and no pickers.
    pub fn new(config: &OptimizationConfig) -> Self {
        let f = config.annualization_factor;
        let mut registry = Self {
            pickers: BTreeMap::new(),
            risk_models: BTreeMap::new(),
        };
        registry.register_risk_model("mean_variance", Arc::new(MinimumVariance::sample(f)));
        registry.register_risk_model("ledoit_wolf", Arc::new(MinimumVariance::ledoit_wolf(f)));
        registry.register_risk_model("nco", Arc::new(NestedClusters::new(config.nco_max_clusters, f)));
        registry.register_risk_model("equal", Arc::new(EqualWeighted::new(f)));
        registry
    }

    /// Registers every `*.json` model file in `dir`. Unreadable files are
    /// skipped with a warning. Returns the number of models registered.
    pub fn scan<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize, PipelineError> {
        let mut count = 0;
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match load_model_spec(&path).and_then(|spec| {
                let name = spec.name().to_string();
                spec.into_classifier().map(|clf| (name, clf))
            }) {
                Ok((name, clf)) => {
                    self.register_picker(name, clf);
                    count += 1;
                }
                Err(e) => warn!("Skipping model file {}: {}", path.display(), e),
            }
        }
        info!("Registered {} models from {}", count, dir.as_ref().display());
        Ok(count)
    }

    pub fn register_picker(&mut self, name: impl Into<String>, classifier: SharedClassifier) {
        self.pickers.insert(name.into(), classifier);
    }

    pub fn register_risk_model(&mut self, name: impl Into<String>, optimizer: SharedRiskOptimizer) {
        self.risk_models.insert(name.into(), optimizer);
    }

    pub fn list_pickers(&self) -> Vec<String> {
        self.pickers.keys().cloned().collect()
    }

    pub fn get_picker(&self, name: &str) -> Result<SharedClassifier, PipelineError> {
        self.pickers
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownModel(name.to_string()))
    }

    pub fn list_risk_models(&self) -> Vec<String> {
        self.risk_models.keys().cloned().collect()
    }

    pub fn get_risk_model(&self, name: &str) -> Result<SharedRiskOptimizer, PipelineError> {
        self.risk_models
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownRiskModel(name.to_string()))
    }
}
