// src/optimizer/mod.rs
//
// Risk optimizer adapter and the risk functions behind it.
// Every risk function takes a date x instrument simple-returns matrix and
// returns long-only weights that sum to 1 plus the in-sample portfolio.

pub mod adapter;
pub mod covariance;
pub mod equal_weight;
pub mod min_variance;
pub mod nco;
pub mod portfolio;
pub mod returns;

pub use adapter::{optimize_portfolio, OptimizedWeights};
pub use covariance::{correlation, ledoit_wolf, sample_covariance, CovarianceEstimator};
pub use equal_weight::EqualWeighted;
pub use min_variance::{min_variance_weights, MinimumVariance};
pub use nco::{average_linkage, NestedClusters};
pub use portfolio::{Portfolio, PortfolioSummary};
pub use returns::{PriceMatrix, ReturnsMatrix};
