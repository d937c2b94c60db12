// src/lib.rs

// 1. Data Structures (The "Nouns")
// explicit 'pub' makes them available to main.rs
pub mod models;

// 2. Interfaces (The "Contract")
pub mod traits;

// 3. Errors and Configuration
pub mod config;
pub mod error;

// 4. Point-in-time Dataset (The "Inputs")
pub mod features;

// 5. Pickers (The "Brains")
pub mod classifier;
pub mod selector;

// 6. Risk Functions and Sizing
pub mod allocation;
pub mod optimizer;
pub mod rebalance;
pub mod report;

// 7. Data Store and Registry (The "Plumbing")
pub mod registry;
pub mod store;

// 8. Request Service (The "Orchestrator")
pub mod pipeline;

pub use error::{PipelineError, Result};
