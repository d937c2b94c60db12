// src/features/mod.rs
//
// Feature & label builder.
// Weekly resampling, trailing technical indicators, cross-sectional
// fundamental normalization, as-of merge and quarter labeling.

pub mod builder;
pub mod fundamentals;
pub mod indicators;
pub mod labels;
pub mod merge;
pub mod resample;
pub mod technicals;

pub use builder::FeatureBuilder;
pub use fundamentals::{normalize_fundamentals, NormalizedFundamentals, NormalizedRecord};
pub use labels::{label_quarters, quarter_ids, JoinedRow};
pub use merge::{asof_join, asof_position};
pub use resample::{resample_weekly, week_ending};
pub use technicals::{compute_technicals, technical_columns, TechnicalRow};
