//! Feature computation for the forecast pipeline.
//!
//! This crate handles:
//! - Window statistics (EMA, population std, returns)
//! - The configurable-window strategy (lags, log return, EMA, volatility, calendar)
//! - The fixed ten-feature strategy and its bounded-tail `featurize`
//! - Strategy selection by configuration tag

pub mod configurable;
pub mod engine;
pub mod fixed_ten;
pub mod stats;
pub mod strategy;

pub use configurable::{ConfigurableWindow, ConfigurableWindowFeatures};
pub use engine::FeatureEngine;
pub use fixed_ten::{featurize, FixedTenFeature, FixedTenFeatures};
pub use stats::RollingStd;
pub use strategy::{FeatureRow, FeatureStrategy, FeatureTable, FeatureVector, TableRow};
