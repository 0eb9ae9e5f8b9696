//! Dataset stage of the forecast pipeline.
//!
//! This crate handles:
//! - Time-ordered train/val/test splitting
//! - Feature CSV output and multi-file split loading
//! - Z-score normalization statistics
//! - Dataset and model metadata
//! - Forecast accuracy metrics

pub mod builder;
pub mod metadata;
pub mod metrics;
pub mod normalization;
pub mod split;
pub mod table_io;

pub use builder::{read_bars, DatasetBuilder, DatasetOutput};
pub use metadata::{select_targets, DatasetMetadata, ModelMetadata};
pub use metrics::{EvaluationReport, ForecastMetrics, HorizonMetrics, MetricsCalculator};
pub use normalization::NormalizationStats;
pub use split::{DatasetSplit, SplitCounts, SplitEngine, SplitName};
pub use table_io::{load_split, LoadedSplit};
